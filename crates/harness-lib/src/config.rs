//! Harness configuration
//!
//! Layers, lowest priority first: built-in defaults, an optional config file
//! (YAML, TOML or JSON by extension), then `K6_HARNESS__*` environment
//! variables. The resulting struct is passed explicitly to every component.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Toleration applied to load generator pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TolerationConfig {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default = "default_toleration_effect")]
    pub effect: String,
}

/// Pass/fail gates handed to the generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_p95_ms")]
    pub p95_ms: f64,
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            p95_ms: default_p95_ms(),
            error_rate: default_error_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Namespace the jobs run in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Base URL of the system under test
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `app` label value used to discover target deployments
    #[serde(default)]
    pub app_label: Option<String>,

    #[serde(default = "default_k6_image")]
    pub k6_image: String,

    #[serde(default = "default_sidecar_image")]
    pub sidecar_image: String,

    /// ConfigMap holding `<type>-test.js` scripts
    #[serde(default = "default_scripts_config_map")]
    pub scripts_config_map: String,

    #[serde(default = "default_service_account")]
    pub service_account: String,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default)]
    pub tolerations: Vec<TolerationConfig>,

    /// Node label whose value names the node pool
    #[serde(default = "default_nodepool_label")]
    pub nodepool_label: String,

    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds_after_finished: i32,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Results kept per (test type, rate) when pruning
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Job status poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Consecutive poll errors tolerated before a run is marked Unknown
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
}

fn default_namespace() -> String {
    "load-testing".to_string()
}

fn default_base_url() -> String {
    "http://app.default.svc.cluster.local".to_string()
}

fn default_k6_image() -> String {
    "grafana/k6:0.49.0".to_string()
}

fn default_sidecar_image() -> String {
    "k6-harness/k6-sidecar:latest".to_string()
}

fn default_scripts_config_map() -> String {
    "k6-scripts".to_string()
}

fn default_service_account() -> String {
    "k6-runner".to_string()
}

fn default_nodepool_label() -> String {
    "agentpool".to_string()
}

fn default_ttl_seconds() -> i32 {
    3600
}

fn default_toleration_effect() -> String {
    "NoSchedule".to_string()
}

fn default_p95_ms() -> f64 {
    500.0
}

fn default_error_rate() -> f64 {
    0.01
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_retention() -> usize {
    30
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_poll_errors() -> u32 {
    5
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            base_url: default_base_url(),
            app_label: None,
            k6_image: default_k6_image(),
            sidecar_image: default_sidecar_image(),
            scripts_config_map: default_scripts_config_map(),
            service_account: default_service_account(),
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
            nodepool_label: default_nodepool_label(),
            ttl_seconds_after_finished: default_ttl_seconds(),
            thresholds: ThresholdConfig::default(),
            results_dir: default_results_dir(),
            retention: default_retention(),
            poll_interval_secs: default_poll_interval(),
            max_poll_errors: default_max_poll_errors(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from an explicit file, or the default path if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("K6_HARNESS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// `~/.config/k6-harness/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("k6-harness").join("config.yaml"))
    }
}
