//! Command implementations

pub mod cleanup;
pub mod compare;
pub mod deploy;
pub mod report;
pub mod suite;

use crate::config;
use crate::output::OutputFormat;
use anyhow::Result;
use harness_lib::{ClusterApi, HarnessConfig, ResultStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Resolved global options shared by every command
pub struct Context {
    pub config: HarnessConfig,
    pub format: OutputFormat,
    pub kubeconfig: Option<PathBuf>,
    pub kube_context: Option<String>,
}

impl Context {
    /// Connect lazily so input errors surface before the cluster is touched
    pub async fn cluster(&self) -> Result<Arc<dyn ClusterApi>> {
        config::connect(self.kubeconfig.as_deref(), self.kube_context.as_deref()).await
    }

    pub fn store(&self) -> ResultStore {
        ResultStore::new(&self.config.results_dir)
    }
}
