//! Job construction
//!
//! The builder turns a [`TestRunSpec`](crate::models::TestRunSpec) into a
//! [`JobDescriptor`]; the manifest module renders the descriptor as typed
//! Kubernetes objects for submission.

mod builder;
mod manifest;
mod profile;

pub use builder::{
    JobSpecBuilder, DEFAULT_LOAD_RAMP_DOWN, DEFAULT_LOAD_RAMP_UP, DEFAULT_LOAD_SUSTAIN,
    DEFAULT_SOAK_DURATION, DEFAULT_SPIKE_DURATION, DEFAULT_SPIKE_MULTIPLIER,
    DEFAULT_SPIKE_TOTAL_DURATION, DEFAULT_STRESS_DURATION,
};
pub use profile::{LoadProfile, SpikeProfile, StageProfile};

use crate::config::TolerationConfig;
use crate::models::{ResourceTier, RunKey};
use std::collections::BTreeMap;
use std::time::Duration;

/// Scheduling constraints for the job's pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePlacement {
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<TolerationConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobImages {
    pub k6: String,
    pub sidecar: String,
}

/// Everything needed to submit one test run
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    /// `<testType>-<rate>rps`
    pub name: String,
    pub namespace: String,
    pub key: RunKey,
    pub labels: BTreeMap<String, String>,
    pub tier: ResourceTier,
    /// Environment of the k6 container, read by the k6 script via `__ENV`
    pub env: BTreeMap<String, String>,
    /// Environment shared by both sidecar roles
    pub sidecar_env: BTreeMap<String, String>,
    pub script_path: String,
    pub profile: LoadProfile,
    pub ttl_seconds_after_finished: i32,
    pub placement: NodePlacement,
    pub images: JobImages,
    pub service_account: String,
    pub scripts_config_map: String,
    /// Ceiling for waiting on a terminal job condition
    pub run_timeout: Duration,
}

impl JobDescriptor {
    /// Name of the per-run ConfigMap carrying `profile.json`
    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.name)
    }

    /// Selector matching the generator pod of this run
    pub fn pod_selector(&self) -> String {
        format!(
            "{}={},{}={}",
            crate::cluster::TEST_TYPE_LABEL,
            self.key.test_type,
            crate::cluster::TARGET_RPS_LABEL,
            self.key.rate
        )
    }
}
