//! Suite execution across test types and rates

use crate::error::{HarnessError, Result};
use crate::models::{RunKey, TerminalState, TestType};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Executes one run of a suite
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, key: RunKey) -> Result<TerminalState>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuiteMode {
    /// One run at a time with a delay between runs
    #[default]
    Sequential,
    /// All runs at once, no delay
    Parallel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub failed_keys: Vec<RunKey>,
}

impl SuiteResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, key: RunKey, result: Result<TerminalState>) {
        self.total += 1;
        match result {
            Ok(state) if state.is_success() => {
                self.passed += 1;
                info!(run = %key, "Run passed");
            }
            Ok(state) => {
                self.failed += 1;
                self.failed_keys.push(key);
                warn!(run = %key, state = %state, "Run failed");
            }
            Err(e) => {
                self.failed += 1;
                self.failed_keys.push(key);
                warn!(run = %key, error = %e, "Run errored");
            }
        }
    }
}

pub struct SuiteRunner {
    executor: Arc<dyn RunExecutor>,
    delay: Duration,
    mode: SuiteMode,
}

impl SuiteRunner {
    pub fn new(executor: Arc<dyn RunExecutor>) -> Self {
        Self {
            executor,
            delay: Duration::from_secs(60),
            mode: SuiteMode::Sequential,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_mode(mut self, mode: SuiteMode) -> Self {
        self.mode = mode;
        self
    }

    /// The cross-product of types and rates, types outermost
    pub fn plan(test_types: &[TestType], rates: &[u32]) -> Result<Vec<RunKey>> {
        if test_types.is_empty() {
            return Err(HarnessError::Input("no test types given".to_string()));
        }
        if rates.is_empty() {
            return Err(HarnessError::Input("no rates given".to_string()));
        }
        if rates.contains(&0) {
            return Err(HarnessError::Input("rates must be greater than zero".to_string()));
        }

        Ok(test_types
            .iter()
            .flat_map(|&t| rates.iter().map(move |&r| RunKey::new(t, r)))
            .collect())
    }

    /// Run every (type, rate) pair. A failed run is recorded and the suite
    /// continues; only invalid input aborts.
    pub async fn run_suite(&self, test_types: &[TestType], rates: &[u32]) -> Result<SuiteResult> {
        let plan = Self::plan(test_types, rates)?;
        let mut result = SuiteResult::default();
        info!(runs = plan.len(), mode = ?self.mode, "Starting suite");

        match self.mode {
            SuiteMode::Sequential => {
                for (i, key) in plan.iter().enumerate() {
                    if i > 0 && !self.delay.is_zero() {
                        info!(delay_secs = self.delay.as_secs(), "Waiting before next run");
                        sleep(self.delay).await;
                    }
                    info!(run = %key, index = i + 1, total = plan.len(), "Starting run");
                    let outcome = self.executor.execute(*key).await;
                    result.record(*key, outcome);
                }
            }
            SuiteMode::Parallel => {
                let outcomes = join_all(plan.iter().map(|key| self.executor.execute(*key))).await;
                for (key, outcome) in plan.iter().zip(outcomes) {
                    result.record(*key, outcome);
                }
            }
        }

        Ok(result)
    }
}
