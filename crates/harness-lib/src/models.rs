//! Core data models for the load-test harness

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Load-profile scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Stress,
    Spike,
    Soak,
    Load,
}

impl TestType {
    pub const ALL: [TestType; 4] = [
        TestType::Stress,
        TestType::Spike,
        TestType::Soak,
        TestType::Load,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Stress => "stress",
            TestType::Spike => "spike",
            TestType::Soak => "soak",
            TestType::Load => "load",
        }
    }

    /// Path of the k6 script inside the scripts volume
    pub fn script_path(&self) -> String {
        format!("/scripts/{}-test.js", self.as_str())
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stress" => Ok(TestType::Stress),
            "spike" => Ok(TestType::Spike),
            "soak" => Ok(TestType::Soak),
            "load" => Ok(TestType::Load),
            other => Err(HarnessError::InvalidSpec(format!(
                "unknown test type '{}' (expected stress, spike, soak or load)",
                other
            ))),
        }
    }
}

/// Identifies a (test type, rate) pair. Renders as `<type>-<rate>rps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub test_type: TestType,
    pub rate: u32,
}

impl RunKey {
    pub fn new(test_type: TestType, rate: u32) -> Self {
        Self { test_type, rate }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}rps", self.test_type, self.rate)
    }
}

/// Scenario-specific knobs. Unset fields take the scenario default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOverrides {
    pub spike_multiplier: Option<u32>,
    pub spike_duration: Option<Duration>,
    pub ramp_up: Option<Duration>,
    pub sustain: Option<Duration>,
    pub ramp_down: Option<Duration>,
}

/// Description of one test run, built by the caller and consumed by the job builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunSpec {
    pub test_type: TestType,
    pub target_rate: u32,
    pub duration: Option<Duration>,
    pub overrides: ScenarioOverrides,
    pub namespace: String,
    pub base_url: String,
    pub app_label: Option<String>,
}

impl TestRunSpec {
    /// Create a spec with namespace, base URL and app label taken from configuration
    pub fn new(test_type: TestType, target_rate: u32, config: &HarnessConfig) -> Self {
        Self {
            test_type,
            target_rate,
            duration: None,
            overrides: ScenarioOverrides::default(),
            namespace: config.namespace.clone(),
            base_url: config.base_url.clone(),
            app_label: config.app_label.clone(),
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_overrides(mut self, overrides: ScenarioOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn key(&self) -> RunKey {
        RunKey::new(self.test_type, self.target_rate)
    }
}

/// Resource sizing class. Ordered low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Low,
    Medium,
    High,
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierName::Low => "low",
            TierName::Medium => "medium",
            TierName::High => "high",
        };
        f.write_str(name)
    }
}

/// Requests and limits for the load generator container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTier {
    pub name: TierName,
    pub cpu_request: String,
    pub memory_request: String,
    pub cpu_limit: String,
    pub memory_limit: String,
}

/// Terminal condition of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    Complete,
    Failed,
    TimedOut,
    Unknown,
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Complete)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalState::Complete => "Complete",
            TerminalState::Failed => "Failed",
            TerminalState::TimedOut => "TimedOut",
            TerminalState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Result of running one job to a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub job_name: String,
    pub key: RunKey,
    pub terminal_state: TerminalState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Load summary reported by the generator, when it could be read
    pub summary: Option<LoadSummary>,
    /// Resource snapshot gathered by the collector, when available
    pub snapshot: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CounterStats {
    pub count: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateStats {
    pub rate: f64,
}

/// Latency trend in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendStats {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Headline k6 metrics of one run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    pub http_reqs: CounterStats,
    pub http_req_failed: RateStats,
    pub http_req_duration: TrendStats,
}

/// Point-in-time CPU/memory usage of a pod or node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub name: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

/// Resource usage gathered by the collector near the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub deployments: BTreeMap<String, Vec<UsageSample>>,
    pub nodepools: BTreeMap<String, Vec<UsageSample>>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.deployments.values().all(Vec::is_empty) && self.nodepools.values().all(Vec::is_empty)
    }
}

/// One persisted run. Never edited after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub test_type: TestType,
    pub rate: u32,
    pub timestamp: DateTime<Utc>,
    pub terminal_state: TerminalState,
    pub metrics: LoadSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<MetricsSnapshot>,
}

impl ResultRecord {
    pub fn key(&self) -> RunKey {
        RunKey::new(self.test_type, self.rate)
    }

    pub fn total_requests(&self) -> u64 {
        self.metrics.http_reqs.count
    }

    pub fn error_rate(&self) -> f64 {
        self.metrics.http_req_failed.rate
    }

    pub fn p50(&self) -> f64 {
        self.metrics.http_req_duration.p50
    }

    pub fn p95(&self) -> f64 {
        self.metrics.http_req_duration.p95
    }

    pub fn p99(&self) -> f64 {
        self.metrics.http_req_duration.p99
    }

    pub fn achieved_rate(&self) -> f64 {
        self.metrics.http_reqs.rate
    }
}
