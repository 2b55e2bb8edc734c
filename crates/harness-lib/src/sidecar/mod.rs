//! In-job metrics sidecar protocol
//!
//! Two processes share an `emptyDir` volume inside the load-test pod:
//!
//! - the **generator** wraps k6. It discovers target deployments and node
//!   pools, writes them as manifests, runs k6, raises `collect-metrics` shortly
//!   before the load phase ends and waits (bounded) for `metrics-done`.
//! - the **collector** waits for `collect-metrics`, reads usage from the
//!   metrics API for everything in the manifests, writes `metrics.json` and
//!   raises `metrics-done`.
//!
//! Each signal file is written by exactly one side and read by the other.
//! When the generator finishes it prints a [`ResultEnvelope`] to stdout so the
//! orchestrator can recover the summary and snapshot from the pod logs.

mod collector;
mod envelope;
mod generator;
mod summary;
mod volume;

pub use collector::{Collector, CollectorPhase, CollectorReport, CollectorSettings};
pub use envelope::{EnvelopeScanner, ResultEnvelope, RESULT_BEGIN, RESULT_END};
pub use generator::{
    discover, Discovery, Generator, GeneratorPhase, GeneratorReport, GeneratorSettings,
    LOAD_FAILED_EXIT,
};
pub use summary::parse_k6_summary;
pub use volume::{read_profile, SharedVolume};

/// Name of the sidecar binary, also the name inside the shared volume
pub const SIDECAR_BINARY: &str = "k6-sidecar";

pub const SHARED_MOUNT: &str = "/shared";
pub const CONFIG_MOUNT: &str = "/config";
pub const SCRIPTS_MOUNT: &str = "/scripts";

pub const INSTALLER_CONTAINER: &str = "install-sidecar";
pub const GENERATOR_CONTAINER: &str = "k6";
pub const COLLECTOR_CONTAINER: &str = "metrics-collector";

pub const PROFILE_FILE: &str = "profile.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const DEPLOYMENTS_FILE: &str = "deployments.txt";
pub const NODEPOOLS_FILE: &str = "nodepools.txt";

/// Raised by the generator when the collector should sample
pub const COLLECT_SIGNAL: &str = "collect-metrics";
/// Raised by the collector once it is finished, successful or not
pub const DONE_SIGNAL: &str = "metrics-done";

/// Environment variables read by both sidecar roles
pub mod env {
    pub const SHARED_DIR: &str = "SIDECAR_SHARED_DIR";
    pub const PROFILE_PATH: &str = "SIDECAR_PROFILE_PATH";
    pub const NAMESPACE: &str = "SIDECAR_NAMESPACE";
    pub const NODEPOOL_LABEL: &str = "SIDECAR_NODEPOOL_LABEL";
    pub const APP_LABEL: &str = "SIDECAR_APP_LABEL";
}
