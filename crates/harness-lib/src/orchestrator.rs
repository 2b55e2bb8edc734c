//! Job runner
//!
//! Submits a job descriptor to the cluster, optionally follows the generator's
//! output, and polls the job to a terminal state. Slot reuse: a job with the
//! same name is deleted and its removal observed before the new one is created.

use crate::cluster::{ClusterApi, LogStream};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::job::JobDescriptor;
use crate::models::{RunOutcome, TerminalState};
use crate::observability::StructuredLogger;
use crate::sidecar::{EnvelopeScanner, ResultEnvelope, GENERATOR_CONTAINER};
use crate::wait::{deadline_after, poll_until, PollPolicy};
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Receives generator output lines while a run is streamed
pub trait LogSink: Send + Sync {
    fn forward(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn forward(&self, line: &str) {
        self(line)
    }
}

/// How the caller wants to wait for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitPolicy {
    /// Follow the generator's output while the job runs
    pub stream_logs: bool,
    /// Override the descriptor's run timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    /// Consecutive status poll errors tolerated before the run is `Unknown`
    pub max_poll_errors: u32,
    /// Bound for observing the removal of a previous job with the same name
    pub removal_timeout: Duration,
    /// Bound for the generator pod to appear, and for its container to start,
    /// when streaming
    pub pod_timeout: Duration,
}

impl RunnerSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            max_poll_errors: config.max_poll_errors,
            removal_timeout: Duration::from_secs(60),
            pod_timeout: Duration::from_secs(120),
        }
    }
}

/// Terminal state from the job's conditions, `None` while it is still running
pub fn terminal_state(job: &Job) -> Option<TerminalState> {
    let conditions = job.status.as_ref()?.conditions.as_ref()?;
    conditions
        .iter()
        .filter(|c| c.status == "True")
        .find_map(|c| match c.type_.as_str() {
            "Complete" => Some(TerminalState::Complete),
            "Failed" => Some(TerminalState::Failed),
            _ => None,
        })
}

/// Whether the generator container is running or has exited. Logs of a
/// container still waiting to start cannot be followed.
pub fn generator_started(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
        .filter(|c| c.name == GENERATOR_CONTAINER)
        .any(|c| {
            c.state
                .as_ref()
                .is_some_and(|s| s.running.is_some() || s.terminated.is_some())
        })
}

pub struct JobRunner {
    cluster: Arc<dyn ClusterApi>,
    logger: StructuredLogger,
    settings: RunnerSettings,
    sink: Option<Arc<dyn LogSink>>,
}

impl JobRunner {
    pub fn new(cluster: Arc<dyn ClusterApi>, config: &HarnessConfig) -> Self {
        Self {
            cluster,
            logger: StructuredLogger::new(&config.namespace),
            settings: RunnerSettings::from_config(config),
            sink: None,
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace any same-named job and submit this one, without waiting
    pub async fn submit(&self, job: &JobDescriptor) -> Result<()> {
        let namespace = job.namespace.as_str();

        if self.cluster.delete_job(namespace, &job.name).await? {
            info!(job = %job.name, "Deleted previous job, waiting for removal");
            let cluster = &self.cluster;
            let name = job.name.as_str();
            let policy = PollPolicy::new(self.settings.removal_timeout, self.settings.poll_interval)
                .with_error_budget(self.settings.max_poll_errors);
            poll_until(&format!("removal of job {}", name), policy, move || async move {
                Ok(cluster.get_job(namespace, name).await?.is_none().then_some(()))
            })
            .await?;
        }

        self.cluster
            .apply_config_map(namespace, &job.to_config_map()?)
            .await?;
        self.cluster.create_job(namespace, &job.to_job()).await?;

        self.logger
            .log_run_submitted(&job.name, &job.key, &job.tier.name.to_string());
        Ok(())
    }

    /// Submit a job and wait for it to reach a terminal state
    pub async fn run(&self, job: &JobDescriptor, wait: &WaitPolicy) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let started = Instant::now();
        self.submit(job).await?;

        let deadline = deadline_after(started, wait.timeout.unwrap_or(job.run_timeout));
        let mut envelope = None;
        let mut pod = None;

        if wait.stream_logs {
            let name = self.find_pod(job, deadline).await?;
            envelope = self.stream_logs(job, &name, deadline).await;
            pod = Some(name);
        }

        let terminal_state = self.await_terminal(job, deadline).await;

        if envelope.is_none() && terminal_state != TerminalState::TimedOut {
            envelope = self.fetch_envelope(job, pod).await;
        }

        let (summary, snapshot) = match envelope {
            Some(envelope) => (envelope.summary, envelope.snapshot),
            None => (None, None),
        };
        if snapshot.is_none() {
            self.logger
                .log_metrics_unavailable(&job.name, "no snapshot in generator output");
        }

        self.logger
            .log_run_finished(&job.name, terminal_state, started.elapsed());

        Ok(RunOutcome {
            job_name: job.name.clone(),
            key: job.key,
            terminal_state,
            started_at,
            finished_at: Utc::now(),
            summary,
            snapshot,
        })
    }

    /// Name of the generator pod. Not finding one is fatal.
    async fn find_pod(&self, job: &JobDescriptor, deadline: Instant) -> Result<String> {
        let timeout = self
            .settings
            .pod_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let policy = PollPolicy::new(timeout, self.settings.poll_interval);

        let cluster = &self.cluster;
        let namespace = job.namespace.as_str();
        let selector = job.pod_selector();
        let selector = selector.as_str();

        poll_until("generator pod", policy, move || async move {
            let pods = cluster.list_pods(namespace, selector).await?;
            Ok(pods.into_iter().find_map(|p| p.metadata.name))
        })
        .await
        .map_err(|e| match e {
            HarnessError::Timeout { .. } => HarnessError::ClusterState(format!(
                "no pod found for job {} (selector {})",
                job.name, selector
            )),
            other => other,
        })
    }

    /// Open the generator's log stream once its container has started.
    /// Follow requests are retried until the pod timeout or the run deadline.
    async fn follow_generator(
        &self,
        job: &JobDescriptor,
        pod: &str,
        deadline: Instant,
    ) -> Result<LogStream> {
        let timeout = self
            .settings
            .pod_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let policy = PollPolicy::new(timeout, self.settings.poll_interval);

        let cluster = &self.cluster;
        let namespace = job.namespace.as_str();
        let selector = job.pod_selector();
        let selector = selector.as_str();

        poll_until("generator container start", policy, move || async move {
            let pods = cluster.list_pods(namespace, selector).await?;
            let started = pods
                .iter()
                .any(|p| p.metadata.name.as_deref() == Some(pod) && generator_started(p));
            if !started {
                return Ok(None);
            }
            match cluster.follow_logs(namespace, pod, GENERATOR_CONTAINER).await {
                Ok(stream) => Ok(Some(stream)),
                Err(e) => {
                    debug!(pod = %pod, error = %e, "Generator logs not available yet");
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Forward output until the stream closes or the deadline passes.
    /// Envelope lines are captured instead of forwarded.
    async fn stream_logs(
        &self,
        job: &JobDescriptor,
        pod: &str,
        deadline: Instant,
    ) -> Option<ResultEnvelope> {
        let mut stream = match self.follow_generator(job, pod, deadline).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(pod = %pod, error = %e, "Could not follow generator logs");
                return None;
            }
        };

        let mut scanner = EnvelopeScanner::default();
        let mut found = None;

        let forward = async {
            while let Some(line) = stream.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(pod = %pod, error = %e, "Log stream interrupted");
                        break;
                    }
                };
                if let Some(envelope) = scanner.feed(&line) {
                    found = Some(envelope);
                    continue;
                }
                if scanner.in_envelope() {
                    continue;
                }
                if let Some(sink) = &self.sink {
                    sink.forward(&line);
                }
            }
        };

        if timeout_at(deadline, forward).await.is_err() {
            warn!(pod = %pod, "Run deadline reached while streaming logs");
        }
        found
    }

    async fn await_terminal(&self, job: &JobDescriptor, deadline: Instant) -> TerminalState {
        let cluster = &self.cluster;
        let namespace = job.namespace.as_str();
        let name = job.name.as_str();
        let timeout = deadline.saturating_duration_since(Instant::now());
        let policy = PollPolicy::new(timeout, self.settings.poll_interval)
            .with_error_budget(self.settings.max_poll_errors);

        let polled = poll_until("job completion", policy, move || async move {
            match cluster.get_job(namespace, name).await? {
                Some(job) => Ok(terminal_state(&job)),
                None => Err(HarnessError::ClusterState(format!("job {} disappeared", name))),
            }
        })
        .await;

        match polled {
            Ok(state) => state,
            Err(HarnessError::Timeout { after, .. }) => {
                warn!(
                    job = %name,
                    after_secs = after.as_secs(),
                    "Job did not finish in time, leaving it in place"
                );
                TerminalState::TimedOut
            }
            Err(e) => {
                warn!(job = %name, error = %e, "Job status unknown after repeated errors");
                TerminalState::Unknown
            }
        }
    }

    /// Best-effort envelope recovery from the finished pod's output
    async fn fetch_envelope(&self, job: &JobDescriptor, pod: Option<String>) -> Option<ResultEnvelope> {
        let pod = match pod {
            Some(pod) => pod,
            None => self
                .cluster
                .list_pods(&job.namespace, &job.pod_selector())
                .await
                .ok()?
                .into_iter()
                .find_map(|p| p.metadata.name)?,
        };

        match self
            .cluster
            .pod_logs(&job.namespace, &pod, GENERATOR_CONTAINER)
            .await
        {
            Ok(logs) => ResultEnvelope::extract(&logs),
            Err(e) => {
                debug!(pod = %pod, error = %e, "Could not fetch generator logs");
                None
            }
        }
    }
}
