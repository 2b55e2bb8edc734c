//! Configuration and cluster connection for the CLI

use anyhow::{Context, Result};
use harness_lib::{ClusterApi, HarnessConfig, KubeCluster};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Flags that override the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub namespace: Option<String>,
    pub results_dir: Option<PathBuf>,
}

/// Load the harness configuration: defaults, then file, then environment, then flags
pub fn load(overrides: &Overrides) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load(overrides.config.as_deref()).with_context(|| {
        match &overrides.config {
            Some(path) => format!("Failed to load config file {}", path.display()),
            None => "Failed to load configuration".to_string(),
        }
    })?;

    if let Some(namespace) = &overrides.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(results_dir) = &overrides.results_dir {
        config.results_dir = results_dir.clone();
    }
    Ok(config)
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs_next::home_dir().map(|home| home.join(".kube").join("config"))
}

/// Connect to the cluster, preferring an explicit kubeconfig or context
pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Arc<dyn ClusterApi>> {
    if kubeconfig.is_none() && context.is_none() {
        let cluster = KubeCluster::try_default()
            .await
            .context("Failed to connect to the cluster")?;
        return Ok(Arc::new(cluster));
    }

    let path = kubeconfig_path(kubeconfig).context("Could not determine kubeconfig path")?;
    let kubeconfig = Kubeconfig::read_from(&path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("Invalid kubeconfig")?;
    let client = kube::Client::try_from(client_config).context("Failed to create Kubernetes client")?;

    Ok(Arc::new(KubeCluster::new(client)))
}
