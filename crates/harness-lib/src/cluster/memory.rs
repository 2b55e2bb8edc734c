//! In-memory cluster used by unit tests

use super::{ClusterApi, LogStream};
use crate::error::{HarnessError, Result};
use crate::models::UsageSample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use crate::sidecar::GENERATOR_CONTAINER;
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStateRunning, ContainerStateWaiting, ContainerStatus,
    Node, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// How a newly created job progresses
#[derive(Debug, Clone, Copy)]
pub(crate) struct JobBehavior {
    /// `get_job` calls before the terminal condition appears
    pub polls_until_terminal: u32,
    /// `Complete`, `Failed`, or `None` to run forever
    pub terminal: Option<&'static str>,
    /// Whether a generator pod appears for the job
    pub spawn_pod: bool,
}

impl Default for JobBehavior {
    fn default() -> Self {
        Self {
            polls_until_terminal: 1,
            terminal: Some("Complete"),
            spawn_pod: true,
        }
    }
}

#[derive(Default)]
struct State {
    jobs: BTreeMap<(String, String), Job>,
    polls_left: BTreeMap<String, u32>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    pods: Vec<(String, Pod)>,
    deployments: Vec<(String, Deployment)>,
    nodes: Vec<Node>,
    pod_usage: BTreeMap<String, Vec<UsageSample>>,
    node_usage: BTreeMap<String, Vec<UsageSample>>,
    logs: BTreeMap<String, Vec<String>>,
    behavior: JobBehavior,
    /// Upcoming `get_job` calls that fail with a transient error
    get_job_errors: u32,
    /// `get_job` calls that still see a deleted job
    deletion_lag: u32,
    lingering: BTreeMap<(String, String), (Job, u32)>,
    /// Deployment and node listing fail
    discovery_down: bool,
    /// `list_pods` calls that still see the generator container waiting to
    /// start; following its logs fails meanwhile
    generator_pending: u32,
    /// Names whose deletion fails
    undeletable: BTreeSet<String>,
    created: Vec<String>,
    deleted: Vec<String>,
}

#[derive(Default)]
pub(crate) struct MemoryCluster {
    state: Mutex<State>,
}

pub(crate) fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).map(|lv| lv == v).unwrap_or(false),
            None => labels.map(|l| l.contains_key(term)).unwrap_or(false),
        })
}

pub(crate) fn meta(
    name: &str,
    namespace: &str,
    labels: &[(&str, &str)],
    created: DateTime<Utc>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        creation_timestamp: Some(Time(created)),
        ..Default::default()
    }
}

fn set_condition(job: &mut Job, condition: &str) {
    job.status = Some(JobStatus {
        conditions: Some(vec![JobCondition {
            type_: condition.to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
}

/// A job in the given terminal condition (`None` for running)
pub(crate) fn job_fixture(
    name: &str,
    namespace: &str,
    labels: &[(&str, &str)],
    condition: Option<&str>,
    created: DateTime<Utc>,
) -> Job {
    let mut job = Job {
        metadata: meta(name, namespace, labels, created),
        ..Default::default()
    };
    if let Some(condition) = condition {
        set_condition(&mut job, condition);
    }
    job
}

/// A deployment labelled and selecting `app=<app>`
pub(crate) fn deployment_fixture(name: &str, namespace: &str, app: &str) -> Deployment {
    Deployment {
        metadata: meta(name, namespace, &[("app", app)], Utc::now()),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod status with the generator container waiting or running
fn generator_status(waiting: bool) -> PodStatus {
    let state = if waiting {
        ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("PodInitializing".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else {
        ContainerState {
            running: Some(ContainerStateRunning {
                started_at: Some(Time(Utc::now())),
            }),
            ..Default::default()
        }
    };
    PodStatus {
        phase: Some(if waiting { "Pending" } else { "Running" }.to_string()),
        container_statuses: Some(vec![ContainerStatus {
            name: GENERATOR_CONTAINER.to_string(),
            state: Some(state),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub(crate) fn pod_fixture(name: &str, waiting: bool) -> Pod {
    Pod {
        metadata: meta(name, "", &[], Utc::now()),
        status: Some(generator_status(waiting)),
        ..Default::default()
    }
}

pub(crate) fn node_fixture(name: &str, pool_label: &str, pool: &str) -> Node {
    Node {
        metadata: meta(name, "", &[(pool_label, pool)], Utc::now()),
        ..Default::default()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: JobBehavior) -> Self {
        let cluster = Self::default();
        cluster.state.lock().unwrap().behavior = behavior;
        cluster
    }

    pub fn insert_job(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        let key = (
            job.metadata.namespace.clone().unwrap_or_default(),
            job.metadata.name.clone().unwrap_or_default(),
        );
        state.jobs.insert(key, job);
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        let mut state = self.state.lock().unwrap();
        let key = (
            config_map.metadata.namespace.clone().unwrap_or_default(),
            config_map.metadata.name.clone().unwrap_or_default(),
        );
        state.config_maps.insert(key, config_map);
    }

    pub fn insert_deployment(&self, namespace: &str, deployment: Deployment) {
        self.state
            .lock()
            .unwrap()
            .deployments
            .push((namespace.to_string(), deployment));
    }

    pub fn insert_node(&self, node: Node) {
        self.state.lock().unwrap().nodes.push(node);
    }

    pub fn set_pod_usage(&self, selector: &str, samples: Vec<UsageSample>) {
        self.state
            .lock()
            .unwrap()
            .pod_usage
            .insert(selector.to_string(), samples);
    }

    pub fn set_node_usage(&self, selector: &str, samples: Vec<UsageSample>) {
        self.state
            .lock()
            .unwrap()
            .node_usage
            .insert(selector.to_string(), samples);
    }

    /// Log lines served for every pod created from now on
    pub fn set_logs(&self, lines: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert("*".to_string(), lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn fail_next_get_job(&self, times: u32) {
        self.state.lock().unwrap().get_job_errors = times;
    }

    pub fn fail_discovery(&self) {
        self.state.lock().unwrap().discovery_down = true;
    }

    pub fn set_generator_start_delay(&self, lists: u32) {
        self.state.lock().unwrap().generator_pending = lists;
    }

    pub fn refuse_delete(&self, name: &str) {
        self.state.lock().unwrap().undeletable.insert(name.to_string());
    }

    pub fn set_deletion_lag(&self, polls: u32) {
        self.state.lock().unwrap().deletion_lag = polls;
    }

    pub fn job_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.jobs.keys().map(|(_, name)| name.clone()).collect()
    }

    pub fn config_map_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.config_maps.keys().map(|(_, name)| name.clone()).collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        if state.get_job_errors > 0 {
            state.get_job_errors -= 1;
            return Err(HarnessError::ClusterState("connection reset".to_string()));
        }

        let key = (namespace.to_string(), name.to_string());
        if let Some((job, left)) = state.lingering.get_mut(&key) {
            if *left > 0 {
                *left -= 1;
                return Ok(Some(job.clone()));
            }
        }
        state.lingering.remove(&key);

        let terminal = state.behavior.terminal;
        let tick = match state.polls_left.get_mut(name) {
            Some(left) if *left > 0 => {
                *left -= 1;
                *left == 0
            }
            _ => false,
        };

        match state.jobs.get_mut(&key) {
            Some(job) => {
                if tick {
                    if let Some(condition) = terminal {
                        set_condition(job, condition);
                    }
                }
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = job.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());
        if state.jobs.contains_key(&key) || state.lingering.contains_key(&key) {
            return Err(HarnessError::ClusterState(format!(
                "job {} already exists",
                name
            )));
        }

        let mut stored = job.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.creation_timestamp = Some(Time(Utc::now()));
        state.jobs.insert(key, stored);
        state.created.push(name.clone());

        let behavior = state.behavior;
        state.polls_left.insert(name.clone(), behavior.polls_until_terminal);

        if behavior.spawn_pod {
            let labels = job
                .spec
                .as_ref()
                .and_then(|s| s.template.metadata.as_ref())
                .and_then(|m| m.labels.clone());
            let pod = Pod {
                metadata: ObjectMeta {
                    name: Some(format!("{}-x7k2p", name)),
                    namespace: Some(namespace.to_string()),
                    labels,
                    ..Default::default()
                },
                ..Default::default()
            };
            state.pods.push((namespace.to_string(), pod));
        }
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.undeletable.contains(name) {
            return Err(HarnessError::ClusterState(format!("jobs \"{}\" is forbidden", name)));
        }
        let key = (namespace.to_string(), name.to_string());
        match state.jobs.remove(&key) {
            Some(job) => {
                let lag = state.deletion_lag;
                if lag > 0 {
                    state.lingering.insert(key, (job, lag));
                }
                state
                    .pods
                    .retain(|(_, p)| !p.metadata.name.as_deref().unwrap_or("").starts_with(name));
                state.deleted.push(name.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_jobs(&self, namespace: &str, selector: &str) -> Result<Vec<Job>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|((ns, _), job)| {
                ns == namespace && matches_selector(job.metadata.labels.as_ref(), selector)
            })
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.creation_timestamp = Some(Time(Utc::now()));
        self.insert_config_map(stored);
        Ok(())
    }

    async fn list_config_maps(&self, namespace: &str, selector: &str) -> Result<Vec<ConfigMap>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .config_maps
            .iter()
            .filter(|((ns, _), cm)| {
                ns == namespace && matches_selector(cm.metadata.labels.as_ref(), selector)
            })
            .map(|(_, cm)| cm.clone())
            .collect())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.undeletable.contains(name) {
            return Err(HarnessError::ClusterState(format!(
                "configmaps \"{}\" is forbidden",
                name
            )));
        }
        let removed = state
            .config_maps
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some();
        if removed {
            state.deleted.push(name.to_string());
        }
        Ok(removed)
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let mut state = self.state.lock().unwrap();
        let waiting = state.generator_pending > 0;
        if waiting {
            state.generator_pending -= 1;
        }
        Ok(state
            .pods
            .iter()
            .filter(|(ns, pod)| {
                ns == namespace && matches_selector(pod.metadata.labels.as_ref(), selector)
            })
            .map(|(_, pod)| Pod {
                status: Some(generator_status(waiting)),
                ..pod.clone()
            })
            .collect())
    }

    async fn follow_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream> {
        if self.state.lock().unwrap().generator_pending > 0 {
            return Err(HarnessError::ClusterState(format!(
                "container \"{}\" in pod \"{}\" is waiting to start: PodInitializing",
                container, pod
            )));
        }
        let text = self.pod_logs(namespace, pod, container).await?;
        let lines: Vec<Result<String>> = text.lines().map(|l| Ok(l.to_string())).collect();
        Ok(futures::stream::iter(lines).boxed())
    }

    async fn pod_logs(&self, _namespace: &str, pod: &str, _container: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        let lines = state
            .logs
            .get(pod)
            .or_else(|| state.logs.get("*"))
            .cloned()
            .unwrap_or_default();
        Ok(lines.join("\n"))
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<Deployment>> {
        let state = self.state.lock().unwrap();
        if state.discovery_down {
            return Err(HarnessError::ClusterState("deployments: forbidden".to_string()));
        }
        Ok(state
            .deployments
            .iter()
            .filter(|(ns, d)| {
                ns == namespace
                    && selector
                        .map(|s| matches_selector(d.metadata.labels.as_ref(), s))
                        .unwrap_or(true)
            })
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .deployments
            .iter()
            .find(|(ns, d)| ns == namespace && d.metadata.name.as_deref() == Some(name))
            .map(|(_, d)| d.clone()))
    }

    async fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<Node>> {
        let state = self.state.lock().unwrap();
        if state.discovery_down {
            return Err(HarnessError::ClusterState("nodes: forbidden".to_string()));
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| {
                selector
                    .map(|s| matches_selector(n.metadata.labels.as_ref(), s))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn pod_usage(&self, _namespace: &str, selector: &str) -> Result<Vec<UsageSample>> {
        let state = self.state.lock().unwrap();
        state
            .pod_usage
            .get(selector)
            .cloned()
            .ok_or_else(|| HarnessError::ClusterState(format!("no pod metrics for {}", selector)))
    }

    async fn node_usage(&self, selector: &str) -> Result<Vec<UsageSample>> {
        let state = self.state.lock().unwrap();
        state
            .node_usage
            .get(selector)
            .cloned()
            .ok_or_else(|| HarnessError::ClusterState(format!("no node metrics for {}", selector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matching() {
        let labels = BTreeMap::from([
            ("test-type".to_string(), "stress".to_string()),
            ("target-rps".to_string(), "100".to_string()),
        ]);
        assert!(matches_selector(Some(&labels), "test-type=stress"));
        assert!(matches_selector(Some(&labels), "test-type=stress,target-rps=100"));
        assert!(!matches_selector(Some(&labels), "test-type=spike"));
        assert!(matches_selector(Some(&labels), "target-rps"));
        assert!(!matches_selector(None, "test-type=stress"));
    }
}
