//! Deadline-bounded polling
//!
//! Every wait in the harness (job removal, pod discovery, job completion,
//! signal files) goes through [`poll_until`], so the timeout and error retry
//! policy lives in one place. Dropping the returned future cancels the wait.

use crate::error::{HarnessError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Stand-in for deadlines too far away to represent
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + after`, clamped instead of overflowing for huge timeouts
pub fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Polling policy for a single wait
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Upper bound for the whole wait
    pub timeout: Duration,
    /// Delay between probes
    pub interval: Duration,
    /// Consecutive probe errors tolerated before the last error is returned
    pub max_consecutive_errors: u32,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_consecutive_errors: 0,
        }
    }

    pub fn with_error_budget(mut self, max_consecutive_errors: u32) -> Self {
        self.max_consecutive_errors = max_consecutive_errors;
        self
    }
}

/// Probe until it yields a value, the deadline passes, or errors exhaust the budget.
///
/// The probe returns `Ok(Some(v))` when done and `Ok(None)` to keep waiting.
/// A timeout is reported as [`HarnessError::Timeout`] naming `what`.
pub async fn poll_until<T, F, Fut>(what: &str, policy: PollPolicy, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = deadline_after(Instant::now(), policy.timeout);
    let mut consecutive_errors = 0u32;

    loop {
        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => consecutive_errors = 0,
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors > policy.max_consecutive_errors {
                    return Err(e);
                }
                debug!(
                    what = %what,
                    attempt = consecutive_errors,
                    error = %e,
                    "Transient error while polling, retrying"
                );
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(HarnessError::Timeout {
                what: what.to_string(),
                after: policy.timeout,
            });
        }
        sleep(policy.interval.min(deadline - now)).await;
    }
}
