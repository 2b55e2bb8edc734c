//! Error taxonomy for the harness
//!
//! Input errors abort before the cluster is touched. Cluster, timeout and
//! persistence errors are reported per run. `MetricsUnavailable` is always
//! absorbed by the caller and downgraded to a missing snapshot.

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The test run description cannot be turned into a job
    #[error("invalid test spec: {0}")]
    InvalidSpec(String),

    /// Bad command-line or configuration input
    #[error("invalid input: {0}")]
    Input(String),

    /// A cluster object was missing or could not be applied
    #[error("cluster state error: {0}")]
    ClusterState(String),

    #[error("timed out after {}s waiting for {what}", after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// Results directory not writable or a record could not be written
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("no results found for {0}")]
    NotFound(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl HarnessError {
    /// Input validation failures abort immediately instead of being recorded per run
    pub fn is_input_error(&self) -> bool {
        matches!(self, HarnessError::InvalidSpec(_) | HarnessError::Input(_))
    }

    /// Returns true when the Kubernetes API answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarnessError::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}
