//! Sidecar configuration
//!
//! Both roles read the same `SIDECAR_*` environment the job builder injects.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SidecarConfig {
    /// Mount point of the volume shared by the k6 and collector containers
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,

    /// Load profile written by the harness into the run ConfigMap
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,

    /// Namespace searched for target deployments
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Node label whose value names the node pool
    #[serde(default = "default_nodepool_label")]
    pub nodepool_label: String,

    #[serde(default)]
    pub app_label: Option<String>,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upper bound for the collector's wait on `collect-metrics`
    #[serde(default = "default_collector_max_wait")]
    pub collector_max_wait_secs: u64,

    /// Upper bound for the generator's wait on `metrics-done`
    #[serde(default = "default_metrics_wait")]
    pub metrics_wait_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_shared_dir() -> PathBuf {
    PathBuf::from("/shared")
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("/config/profile.json")
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_nodepool_label() -> String {
    "agentpool".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_collector_max_wait() -> u64 {
    2 * 60 * 60
}

fn default_metrics_wait() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    2
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            shared_dir: default_shared_dir(),
            profile_path: default_profile_path(),
            namespace: default_namespace(),
            nodepool_label: default_nodepool_label(),
            app_label: None,
            api_port: default_api_port(),
            collector_max_wait_secs: default_collector_max_wait(),
            metrics_wait_secs: default_metrics_wait(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl SidecarConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SIDECAR"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn collector_max_wait(&self) -> Duration {
        Duration::from_secs(self.collector_max_wait_secs)
    }

    pub fn metrics_wait(&self) -> Duration {
        Duration::from_secs(self.metrics_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
