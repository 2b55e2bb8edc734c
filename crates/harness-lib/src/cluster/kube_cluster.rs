//! `ClusterApi` backed by a kube-rs client

use super::{ClusterApi, LogStream};
use crate::error::{HarnessError, Result};
use crate::models::UsageSample;
use crate::quantity::{cpu_millicores, memory_bytes};
use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch,
    PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::{debug, info};

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "k6-harness";

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the local kubeconfig or the in-cluster service account
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", kind);
        ApiResource::from_gvk_with_plural(&gvk, plural)
    }
}

fn labels(selector: &str) -> ListParams {
    ListParams::default().labels(selector)
}

/// Read `cpu`/`memory` quantities out of a metrics.k8s.io usage object
fn usage_of(usage: &Value) -> (u64, u64) {
    let cpu = usage
        .get("cpu")
        .and_then(Value::as_str)
        .and_then(cpu_millicores)
        .unwrap_or(0);
    let memory = usage
        .get("memory")
        .and_then(Value::as_str)
        .and_then(memory_bytes)
        .unwrap_or(0);
    (cpu, memory)
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<()> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let created = api.create(&PostParams::default(), job).await?;
        info!(job = %created.name_any(), namespace = %namespace, "Created job");
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                debug!(job = %name, "Deleted job");
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&labels(selector)).await?.items)
    }

    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.name_any();
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(config_map),
        )
        .await?;
        debug!(config_map = %name, "Applied config map");
        Ok(())
    }

    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&labels(selector)).await?.items)
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&labels(selector)).await?.items)
    }

    async fn follow_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            follow: true,
            container: Some(container.to_string()),
            ..Default::default()
        };

        let reader = api.log_stream(pod, &params).await?;
        Ok(reader.lines().map_err(HarnessError::from).boxed())
    }

    async fn pod_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        Ok(api.logs(pod, &params).await?)
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let params = selector.map(labels).unwrap_or_default();
        Ok(api.list(&params).await?.items)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = selector.map(labels).unwrap_or_default();
        Ok(api.list(&params).await?.items)
    }

    async fn pod_usage(&self, namespace: &str, selector: &str) -> Result<Vec<UsageSample>> {
        let resource = Self::metrics_resource("PodMetrics", "pods");
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let list = api.list(&labels(selector)).await?;

        let samples = list
            .items
            .iter()
            .map(|pod| {
                let (cpu, memory) = pod
                    .data
                    .get("containers")
                    .and_then(Value::as_array)
                    .map(|containers| {
                        containers
                            .iter()
                            .filter_map(|c| c.get("usage"))
                            .map(usage_of)
                            .fold((0, 0), |acc, (c, m)| (acc.0 + c, acc.1 + m))
                    })
                    .unwrap_or((0, 0));

                UsageSample {
                    name: pod.name_any(),
                    cpu_millicores: cpu,
                    memory_bytes: memory,
                }
            })
            .collect();

        Ok(samples)
    }

    async fn node_usage(&self, selector: &str) -> Result<Vec<UsageSample>> {
        let resource = Self::metrics_resource("NodeMetrics", "nodes");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = api.list(&labels(selector)).await?;

        let samples = list
            .items
            .iter()
            .map(|node| {
                let (cpu, memory) = node.data.get("usage").map(usage_of).unwrap_or((0, 0));
                UsageSample {
                    name: node.name_any(),
                    cpu_millicores: cpu,
                    memory_bytes: memory,
                }
            })
            .collect();

        Ok(samples)
    }
}
