//! Observability for the harness
//!
//! Provides:
//! - Prometheus metrics for the in-job sidecar (collection latency, samples,
//!   errors, signal wait time)
//! - Structured run lifecycle events with tracing

use crate::models::{RunKey, TerminalState};
use crate::suite::SuiteResult;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for metrics API round trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Buckets for time spent waiting on a shared-volume signal (in seconds)
const WAIT_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0];

/// Sidecar metrics for Prometheus exposition
///
/// Each instance owns its registry; clones share the same underlying metrics.
#[derive(Clone)]
pub struct SidecarMetrics {
    registry: Registry,
    collection_latency_seconds: Histogram,
    signal_wait_seconds: Histogram,
    samples_collected: IntGauge,
    collection_errors: IntCounter,
}

impl SidecarMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let collection_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "k6_sidecar_collection_latency_seconds",
                "Time spent reading usage from the metrics API",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let signal_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "k6_sidecar_signal_wait_seconds",
                "Time spent waiting for a shared-volume signal",
            )
            .buckets(WAIT_BUCKETS.to_vec()),
        )?;
        let samples_collected = IntGauge::new(
            "k6_sidecar_samples_collected",
            "Usage samples in the most recent snapshot",
        )?;
        let collection_errors = IntCounter::new(
            "k6_sidecar_collection_errors_total",
            "Metrics API calls that failed during collection",
        )?;

        registry.register(Box::new(collection_latency_seconds.clone()))?;
        registry.register(Box::new(signal_wait_seconds.clone()))?;
        registry.register(Box::new(samples_collected.clone()))?;
        registry.register(Box::new(collection_errors.clone()))?;

        Ok(Self {
            registry,
            collection_latency_seconds,
            signal_wait_seconds,
            samples_collected,
            collection_errors,
        })
    }

    pub fn observe_collection_latency(&self, elapsed: Duration) {
        self.collection_latency_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn observe_signal_wait(&self, elapsed: Duration) {
        self.signal_wait_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn set_samples_collected(&self, count: usize) {
        self.samples_collected.set(count as i64);
    }

    pub fn inc_collection_errors(&self) {
        self.collection_errors.inc();
    }

    pub fn collection_errors(&self) -> u64 {
        self.collection_errors.get()
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for run lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_run_submitted(&self, job_name: &str, key: &RunKey, tier: &str) {
        info!(
            event = "run_submitted",
            namespace = %self.namespace,
            job = %job_name,
            test_type = %key.test_type,
            target_rps = key.rate,
            tier = %tier,
            "Submitted load test job"
        );
    }

    pub fn log_run_finished(&self, job_name: &str, state: TerminalState, elapsed: Duration) {
        if state.is_success() {
            info!(
                event = "run_finished",
                namespace = %self.namespace,
                job = %job_name,
                state = %state,
                elapsed_secs = elapsed.as_secs(),
                "Load test job finished"
            );
        } else {
            warn!(
                event = "run_finished",
                namespace = %self.namespace,
                job = %job_name,
                state = %state,
                elapsed_secs = elapsed.as_secs(),
                "Load test job did not complete"
            );
        }
    }

    pub fn log_metrics_unavailable(&self, job_name: &str, reason: &str) {
        warn!(
            event = "metrics_unavailable",
            namespace = %self.namespace,
            job = %job_name,
            reason = %reason,
            "Resource metrics unavailable for run"
        );
    }

    pub fn log_suite_finished(&self, summary: &SuiteResult) {
        let failed: Vec<String> = summary.failed_keys.iter().map(ToString::to_string).collect();
        info!(
            event = "suite_finished",
            namespace = %self.namespace,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            failed_keys = ?failed,
            "Suite finished"
        );
    }

    pub fn log_cleanup_candidate(&self, kind: &str, name: &str, dry_run: bool) {
        info!(
            event = "cleanup_candidate",
            namespace = %self.namespace,
            kind = %kind,
            name = %name,
            dry_run = dry_run,
            "Selected resource for cleanup"
        );
    }
}
