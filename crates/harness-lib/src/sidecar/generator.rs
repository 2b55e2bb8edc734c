//! Generator role: wraps the k6 process

use super::{ResultEnvelope, SharedVolume, COLLECT_SIGNAL, DONE_SIGNAL};
use crate::cluster::ClusterApi;
use crate::error::{HarnessError, Result};
use crate::job::LoadProfile;
use crate::wait::PollPolicy;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Exit code reported when the load command could not be run at all
pub const LOAD_FAILED_EXIT: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorPhase {
    Discovering,
    Running,
    SignalingCollector,
    AwaitingMetrics,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    /// How long before the end of the load phase the collector is signaled
    pub signal_lead: Duration,
    /// Upper bound for waiting on `metrics-done` after k6 exits
    pub metrics_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            signal_lead: Duration::from_secs(10),
            metrics_wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Names written to the manifests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub deployments: Vec<String>,
    pub nodepools: Vec<String>,
}

/// List target deployments and the node pools they can land on.
///
/// Deployments are filtered by `app=<app_label>` when given. Node pools are
/// the distinct values of `nodepool_label` across nodes carrying it.
pub async fn discover(
    cluster: &dyn ClusterApi,
    namespace: &str,
    app_label: Option<&str>,
    nodepool_label: &str,
) -> Result<Discovery> {
    let selector = app_label.map(|app| format!("app={}", app));
    let deployments: BTreeSet<String> = cluster
        .list_deployments(namespace, selector.as_deref())
        .await?
        .iter()
        .map(Deployment::name_any)
        .collect();

    let nodepools: BTreeSet<String> = cluster
        .list_nodes(Some(nodepool_label))
        .await?
        .iter()
        .filter_map(|node| node.labels().get(nodepool_label).cloned())
        .collect();

    Ok(Discovery {
        deployments: deployments.into_iter().collect(),
        nodepools: nodepools.into_iter().collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorReport {
    pub exit_code: i32,
    /// k6 exited before the scheduled collect signal
    pub early_exit: bool,
    /// The collector answered within the bounded wait
    pub metrics_done: bool,
    /// Why the load command failed to run, if it did
    pub load_error: Option<String>,
    pub phases: Vec<GeneratorPhase>,
    pub envelope: ResultEnvelope,
}

pub struct Generator {
    cluster: Arc<dyn ClusterApi>,
    volume: SharedVolume,
    namespace: String,
    app_label: Option<String>,
    nodepool_label: String,
    settings: GeneratorSettings,
}

impl Generator {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        volume: SharedVolume,
        namespace: impl Into<String>,
        nodepool_label: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            volume,
            namespace: namespace.into(),
            app_label: None,
            nodepool_label: nodepool_label.into(),
            settings: GeneratorSettings::default(),
        }
    }

    pub fn with_app_label(mut self, app_label: Option<String>) -> Self {
        self.app_label = app_label;
        self
    }

    pub fn with_settings(mut self, settings: GeneratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Drive one run. `load` resolves to k6's exit code.
    ///
    /// A failing `load` still signals the collector and waits for it, and is
    /// reported as [`LOAD_FAILED_EXIT`].
    pub async fn run<F>(&self, profile: &LoadProfile, load: F) -> Result<GeneratorReport>
    where
        F: Future<Output = Result<i32>>,
    {
        let mut phases = vec![GeneratorPhase::Discovering];
        let discovery = match discover(
            self.cluster.as_ref(),
            &self.namespace,
            self.app_label.as_deref(),
            &self.nodepool_label,
        )
        .await
        {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(error = %e, "Discovery failed, collector will see empty manifests");
                Discovery::default()
            }
        };
        info!(
            deployments = discovery.deployments.len(),
            nodepools = discovery.nodepools.len(),
            "Wrote discovery manifests"
        );
        self.volume
            .write_manifests(&discovery.deployments, &discovery.nodepools)
            .await?;

        phases.push(GeneratorPhase::Running);
        let signal_after = profile.total_duration().saturating_sub(self.settings.signal_lead);
        tokio::pin!(load);
        let mut load_error = None;
        let mut settle = |exit: Result<i32>| match exit {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "Load command failed to run");
                load_error = Some(e.to_string());
                LOAD_FAILED_EXIT
            }
        };
        let early = tokio::select! {
            exit = &mut load => Some(settle(exit)),
            _ = sleep(signal_after) => None,
        };

        phases.push(GeneratorPhase::SignalingCollector);
        self.volume.raise(COLLECT_SIGNAL).await?;
        info!(early_exit = early.is_some(), "Signaled collector");

        let exit_code = match early {
            Some(code) => code,
            None => settle(load.await),
        };

        phases.push(GeneratorPhase::AwaitingMetrics);
        let policy = PollPolicy::new(self.settings.metrics_wait, self.settings.poll_interval);
        let metrics_done = match self.volume.wait_for(DONE_SIGNAL, policy).await {
            Ok(()) => true,
            Err(HarnessError::Timeout { .. }) => {
                warn!(
                    waited_secs = self.settings.metrics_wait.as_secs(),
                    "Collector did not finish in time"
                );
                false
            }
            Err(e) => return Err(e),
        };

        let summary = self.volume.read_summary().await.unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable k6 summary");
            None
        });
        let snapshot = self.volume.read_metrics().await.unwrap_or_else(|e| {
            warn!(error = %e, "Unreadable metrics snapshot");
            None
        });
        if snapshot.is_none() {
            warn!("Metrics unavailable for this run");
        }

        phases.push(GeneratorPhase::Done);
        Ok(GeneratorReport {
            exit_code,
            early_exit: early.is_some(),
            metrics_done,
            load_error,
            phases,
            envelope: ResultEnvelope {
                exit_code,
                summary,
                snapshot,
            },
        })
    }
}
