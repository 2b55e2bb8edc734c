//! Cleanup of harness-managed cluster resources
//!
//! Candidates are selected once from live cluster state; a dry run returns the
//! same list a real run would delete, without deleting anything.

use crate::cluster::{managed_selector, ClusterApi, TARGET_RPS_LABEL, TEST_TYPE_LABEL};
use crate::error::Result;
use crate::models::{TerminalState, TestType};
use crate::observability::StructuredLogger;
use crate::orchestrator::terminal_state;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupScope {
    /// Jobs and their ConfigMaps
    #[default]
    All,
    JobsOnly,
    CompletedOnly,
    FailedOnly,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupFilter {
    pub scope: CleanupScope,
    pub older_than: Option<Duration>,
    pub test_type: Option<TestType>,
    pub rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    Job,
    ConfigMap,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Job => f.write_str("job"),
            ResourceKind::ConfigMap => f.write_str("configmap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CleanupCandidate {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for CleanupCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A candidate whose deletion failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub candidate: CleanupCandidate,
    pub error: String,
}

/// What a cleanup selected, and which deletions failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Every matching resource, deleted or not
    pub selected: Vec<CleanupCandidate>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Error of a failed deletion, `None` if it succeeded or was not attempted
    pub fn failure(&self, candidate: &CleanupCandidate) -> Option<&str> {
        self.failed
            .iter()
            .find(|f| &f.candidate == candidate)
            .map(|f| f.error.as_str())
    }
}

impl CleanupFilter {
    /// Type, rate and age checks shared by every resource kind
    fn matches_meta(&self, meta: &ObjectMeta, now: DateTime<Utc>) -> bool {
        let label = |key: &str| meta.labels.as_ref().and_then(|l| l.get(key));

        if let Some(test_type) = self.test_type {
            if label(TEST_TYPE_LABEL).map(String::as_str) != Some(test_type.as_str()) {
                return false;
            }
        }
        if let Some(rate) = self.rate {
            if label(TARGET_RPS_LABEL) != Some(&rate.to_string()) {
                return false;
            }
        }
        if let Some(older_than) = self.older_than {
            let created = match &meta.creation_timestamp {
                Some(time) => time.0,
                None => return false,
            };
            let age = now.signed_duration_since(created).to_std().unwrap_or_default();
            if age < older_than {
                return false;
            }
        }
        true
    }

    fn wants_state(&self, state: Option<TerminalState>) -> bool {
        match self.scope {
            CleanupScope::All | CleanupScope::JobsOnly => true,
            CleanupScope::CompletedOnly => state == Some(TerminalState::Complete),
            CleanupScope::FailedOnly => state == Some(TerminalState::Failed),
        }
    }

    fn includes_config_maps(&self) -> bool {
        self.scope == CleanupScope::All
    }
}

/// Select the resources `filter` matches
pub async fn candidates(
    cluster: &dyn ClusterApi,
    namespace: &str,
    filter: &CleanupFilter,
    now: DateTime<Utc>,
) -> Result<Vec<CleanupCandidate>> {
    let selector = managed_selector();
    let mut selected = Vec::new();

    for job in cluster.list_jobs(namespace, &selector).await? {
        if filter.matches_meta(&job.metadata, now) && filter.wants_state(terminal_state(&job)) {
            if let Some(name) = job.metadata.name {
                selected.push(CleanupCandidate {
                    kind: ResourceKind::Job,
                    namespace: namespace.to_string(),
                    name,
                });
            }
        }
    }

    if filter.includes_config_maps() {
        for config_map in cluster.list_config_maps(namespace, &selector).await? {
            if filter.matches_meta(&config_map.metadata, now) {
                if let Some(name) = config_map.metadata.name {
                    selected.push(CleanupCandidate {
                        kind: ResourceKind::ConfigMap,
                        namespace: namespace.to_string(),
                        name,
                    });
                }
            }
        }
    }

    selected.sort();
    Ok(selected)
}

/// Delete (or with `dry_run`, only report) every matching resource.
///
/// The selection is the same with and without `dry_run`. Resources that
/// vanished in the meantime are still reported as selected. A failed deletion
/// is recorded and the remaining candidates are still processed.
pub async fn clean(
    cluster: &dyn ClusterApi,
    namespace: &str,
    filter: &CleanupFilter,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<CleanupReport> {
    let logger = StructuredLogger::new(namespace);
    let selected = candidates(cluster, namespace, filter, now).await?;
    let mut failed = Vec::new();

    for candidate in &selected {
        logger.log_cleanup_candidate(&candidate.kind.to_string(), &candidate.name, dry_run);
        if dry_run {
            continue;
        }
        let deleted = match candidate.kind {
            ResourceKind::Job => cluster.delete_job(namespace, &candidate.name).await,
            ResourceKind::ConfigMap => cluster.delete_config_map(namespace, &candidate.name).await,
        };
        match deleted {
            Ok(true) => {}
            Ok(false) => warn!(resource = %candidate, "Already gone"),
            Err(e) => {
                warn!(resource = %candidate, error = %e, "Failed to delete");
                failed.push(CleanupFailure {
                    candidate: candidate.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(CleanupReport { selected, failed })
}
