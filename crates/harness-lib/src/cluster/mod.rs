//! Cluster capability used by every component that touches Kubernetes
//!
//! Components receive an `Arc<dyn ClusterApi>` so tests can substitute an
//! in-memory cluster while production uses [`KubeCluster`].

mod kube_cluster;
#[cfg(test)]
pub(crate) mod memory;

pub use kube_cluster::KubeCluster;

use crate::error::Result;
use crate::models::UsageSample;
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};

/// Label carried by every object the harness creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_VALUE: &str = "k6-load-test";
pub const TEST_TYPE_LABEL: &str = "test-type";
pub const TARGET_RPS_LABEL: &str = "target-rps";

/// Selector matching every harness-managed object
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}

/// Stream of log lines from a followed container
pub type LogStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Get a Job, `None` if it does not exist
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<()>;

    /// Delete a Job and its pods. Returns false if it was already gone.
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>>;

    /// Create or replace a ConfigMap
    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>>;

    /// Follow a container's output until the container exits
    async fn follow_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream>;

    /// Fetch the current output of a container
    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<String>;

    async fn list_deployments(&self, namespace: &str, selector: Option<&str>)
        -> Result<Vec<Deployment>>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    async fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<Node>>;

    /// Current usage of pods matching a selector, summed over containers
    async fn pod_usage(&self, namespace: &str, selector: &str) -> Result<Vec<UsageSample>>;

    /// Current usage of nodes matching a selector
    async fn node_usage(&self, selector: &str) -> Result<Vec<UsageSample>>;
}

/// Render a deployment's `matchLabels` as a label selector string
pub fn deployment_selector(deployment: &Deployment) -> Option<String> {
    let labels = deployment
        .spec
        .as_ref()?
        .selector
        .match_labels
        .as_ref()?;

    if labels.is_empty() {
        return None;
    }

    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::collections::BTreeMap;

    #[test]
    fn test_deployment_selector_joins_match_labels() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([
                        ("app".to_string(), "api".to_string()),
                        ("tier".to_string(), "web".to_string()),
                    ])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            deployment_selector(&deployment).as_deref(),
            Some("app=api,tier=web")
        );
    }

    #[test]
    fn test_deployment_selector_absent() {
        assert_eq!(deployment_selector(&Deployment::default()), None);
    }
}
