//! Shared-volume files and signals

use super::{DEPLOYMENTS_FILE, METRICS_FILE, NODEPOOLS_FILE, SUMMARY_FILE};
use crate::error::{HarnessError, Result};
use crate::job::LoadProfile;
use crate::models::{LoadSummary, MetricsSnapshot};
use crate::wait::{poll_until, PollPolicy};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Read the load profile mounted from the per-run ConfigMap
pub async fn read_profile(path: &Path) -> Result<LoadProfile> {
    let raw = fs::read_to_string(path).await.map_err(|e| {
        HarnessError::InvalidSpec(format!("cannot read profile {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&raw)?)
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// View over the `emptyDir` volume shared by generator and collector
#[derive(Debug, Clone)]
pub struct SharedVolume {
    root: PathBuf,
}

impl SharedVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write a file so readers never observe partial content
    async fn write_atomic(&self, name: &str, content: &[u8]) -> Result<()> {
        let tmp = self.path(&format!(".{}.tmp", name));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, self.path(name)).await?;
        Ok(())
    }

    async fn write_lines(&self, name: &str, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        self.write_atomic(name, content.as_bytes()).await
    }

    async fn read_lines(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(read_optional(&self.path(name)).await?.map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        }))
    }

    pub async fn write_manifests(&self, deployments: &[String], nodepools: &[String]) -> Result<()> {
        self.write_lines(DEPLOYMENTS_FILE, deployments).await?;
        self.write_lines(NODEPOOLS_FILE, nodepools).await
    }

    /// Both manifests, or `None` when either has not been written
    pub async fn read_manifests(&self) -> Result<Option<(Vec<String>, Vec<String>)>> {
        let deployments = self.read_lines(DEPLOYMENTS_FILE).await?;
        let nodepools = self.read_lines(NODEPOOLS_FILE).await?;
        Ok(deployments.zip(nodepools))
    }

    pub async fn raise(&self, signal: &str) -> Result<()> {
        self.write_atomic(signal, b"").await
    }

    pub async fn is_raised(&self, signal: &str) -> bool {
        fs::try_exists(self.path(signal)).await.unwrap_or(false)
    }

    /// Wait until `signal` exists or the policy's timeout passes
    pub async fn wait_for(&self, signal: &str, policy: PollPolicy) -> Result<()> {
        poll_until(signal, policy, || async move {
            Ok(self.is_raised(signal).await.then_some(()))
        })
        .await
    }

    pub async fn write_metrics(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(METRICS_FILE, &body).await
    }

    pub async fn read_metrics(&self) -> Result<Option<MetricsSnapshot>> {
        match read_optional(&self.path(METRICS_FILE)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The k6 summary export, when k6 wrote one
    pub async fn read_summary(&self) -> Result<Option<LoadSummary>> {
        match read_optional(&self.path(SUMMARY_FILE)).await? {
            Some(raw) => Ok(Some(super::parse_k6_summary(&raw)?)),
            None => Ok(None),
        }
    }
}
