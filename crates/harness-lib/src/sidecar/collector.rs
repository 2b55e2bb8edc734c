//! Collector role: samples resource usage when signaled

use super::{SharedVolume, COLLECT_SIGNAL, DONE_SIGNAL};
use crate::cluster::{deployment_selector, ClusterApi};
use crate::error::{HarnessError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{MetricsSnapshot, UsageSample};
use crate::observability::SidecarMetrics;
use crate::wait::PollPolicy;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorPhase {
    Idle,
    Waiting,
    Collecting,
    Writing,
    Signaling,
    Exit,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorSettings {
    /// Upper bound for waiting on `collect-metrics`
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(2 * 60 * 60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorReport {
    pub phases: Vec<CollectorPhase>,
    /// Written snapshot, `None` when metrics are unavailable
    pub snapshot: Option<MetricsSnapshot>,
}

pub struct Collector {
    cluster: Arc<dyn ClusterApi>,
    volume: SharedVolume,
    namespace: String,
    nodepool_label: String,
    settings: CollectorSettings,
    health: HealthRegistry,
    metrics: SidecarMetrics,
}

impl Collector {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        volume: SharedVolume,
        namespace: impl Into<String>,
        nodepool_label: impl Into<String>,
        health: HealthRegistry,
        metrics: SidecarMetrics,
    ) -> Self {
        Self {
            cluster,
            volume,
            namespace: namespace.into(),
            nodepool_label: nodepool_label.into(),
            settings: CollectorSettings::default(),
            health,
            metrics,
        }
    }

    pub fn with_settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wait for the signal, collect, and always raise `metrics-done`.
    ///
    /// Only a failure to raise `metrics-done` itself is returned as an error.
    pub async fn run(&self) -> Result<CollectorReport> {
        let mut phases = vec![CollectorPhase::Idle];
        for component in [
            components::DISCOVERY,
            components::COLLECTOR,
            components::CLUSTER_API,
        ] {
            self.health.register(component).await;
        }
        self.health.set_ready(true).await;

        phases.push(CollectorPhase::Waiting);
        let started = Instant::now();
        let policy = PollPolicy::new(self.settings.max_wait, self.settings.poll_interval);
        let signaled = self.volume.wait_for(COLLECT_SIGNAL, policy).await;
        self.metrics.observe_signal_wait(started.elapsed());

        let snapshot = match signaled {
            Ok(()) => {
                phases.push(CollectorPhase::Collecting);
                match self.collect().await {
                    Ok(snapshot) => {
                        phases.push(CollectorPhase::Writing);
                        match self.volume.write_metrics(&snapshot).await {
                            Ok(()) => Some(snapshot),
                            Err(e) => {
                                warn!(error = %e, "Failed to write metrics");
                                None
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Metrics unavailable");
                        self.health
                            .set_unhealthy(components::COLLECTOR, e.to_string())
                            .await;
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Collect signal never arrived");
                self.health
                    .set_degraded(components::COLLECTOR, e.to_string())
                    .await;
                None
            }
        };

        phases.push(CollectorPhase::Signaling);
        self.volume.raise(DONE_SIGNAL).await?;
        phases.push(CollectorPhase::Exit);

        Ok(CollectorReport { phases, snapshot })
    }

    async fn collect(&self) -> Result<MetricsSnapshot> {
        let (deployments, nodepools) = match self.volume.read_manifests().await? {
            Some(manifests) => manifests,
            None => {
                let message = "discovery manifests are missing";
                self.health.set_unhealthy(components::DISCOVERY, message).await;
                return Err(HarnessError::MetricsUnavailable(message.to_string()));
            }
        };
        if deployments.is_empty() && nodepools.is_empty() {
            self.health
                .set_degraded(components::DISCOVERY, "no deployments or node pools discovered")
                .await;
        }

        let mut snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            deployments: BTreeMap::new(),
            nodepools: BTreeMap::new(),
        };

        for name in &deployments {
            if let Some(samples) = self.deployment_usage(name).await {
                snapshot.deployments.insert(name.clone(), samples);
            }
        }
        for pool in &nodepools {
            let selector = format!("{}={}", self.nodepool_label, pool);
            if let Some(samples) = self.timed(self.cluster.node_usage(&selector)).await {
                snapshot.nodepools.insert(pool.clone(), samples);
            }
        }

        let samples: usize = snapshot
            .deployments
            .values()
            .chain(snapshot.nodepools.values())
            .map(Vec::len)
            .sum();
        self.metrics.set_samples_collected(samples);
        info!(
            deployments = snapshot.deployments.len(),
            nodepools = snapshot.nodepools.len(),
            samples = samples,
            "Collected resource usage"
        );

        Ok(snapshot)
    }

    async fn deployment_usage(&self, name: &str) -> Option<Vec<UsageSample>> {
        let deployment = match self.cluster.get_deployment(&self.namespace, name).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) => {
                debug!(deployment = %name, "Deployment disappeared before collection");
                return None;
            }
            Err(e) => {
                self.record_error(&e).await;
                return None;
            }
        };
        let selector = deployment_selector(&deployment)?;
        self.timed(self.cluster.pod_usage(&self.namespace, &selector))
            .await
    }

    /// Run one metrics API call, recording its latency and any error
    async fn timed<F>(&self, call: F) -> Option<Vec<UsageSample>>
    where
        F: std::future::Future<Output = Result<Vec<UsageSample>>>,
    {
        let started = Instant::now();
        let result = call.await;
        self.metrics.observe_collection_latency(started.elapsed());
        match result {
            Ok(samples) => Some(samples),
            Err(e) => {
                self.record_error(&e).await;
                None
            }
        }
    }

    async fn record_error(&self, error: &HarnessError) {
        warn!(error = %error, "Metrics API call failed");
        self.metrics.inc_collection_errors();
        self.health
            .set_degraded(components::CLUSTER_API, error.to_string())
            .await;
    }
}
