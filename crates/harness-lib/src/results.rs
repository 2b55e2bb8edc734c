//! Result persistence
//!
//! One JSON file per run, named `<testType>-<rate>rps-<YYYY-MM-DD-HHMMSS>.json`
//! with the UTC finish time. Records are never rewritten; ordering comes from
//! the timestamp encoded in the file name.

use crate::error::{HarnessError, Result};
use crate::models::{MetricsSnapshot, ResultRecord, RunKey, RunOutcome, TestType};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// A result file name split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordName {
    pub key: RunKey,
    pub timestamp: DateTime<Utc>,
}

impl RecordName {
    pub fn new(key: RunKey, timestamp: DateTime<Utc>) -> Self {
        Self { key, timestamp }
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.key, self.timestamp.format(TIMESTAMP_FORMAT))
    }

    /// Parse `<type>-<rate>rps-<timestamp>.json`; `None` for foreign files
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let (test_type, rest) = stem.split_once('-')?;
        let (rate, timestamp) = rest.split_once("rps-")?;

        let test_type: TestType = test_type.parse().ok()?;
        let rate: u32 = rate.parse().ok()?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();

        Some(Self::new(RunKey::new(test_type, rate), timestamp))
    }
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a finished run.
    ///
    /// `snapshot` overrides the snapshot carried by the outcome. Fails with
    /// `Persistence` when the outcome has no load summary, the directory is
    /// not writable, or a record for the same key and second already exists.
    pub fn save(
        &self,
        outcome: &RunOutcome,
        snapshot: Option<&MetricsSnapshot>,
    ) -> Result<ResultRecord> {
        let metrics = outcome.summary.ok_or_else(|| {
            HarnessError::Persistence(format!("run {} produced no load summary", outcome.job_name))
        })?;

        let record = ResultRecord {
            test_type: outcome.key.test_type,
            rate: outcome.key.rate,
            timestamp: outcome.finished_at,
            terminal_state: outcome.terminal_state,
            metrics,
            resources: snapshot.cloned().or_else(|| outcome.snapshot.clone()),
        };

        fs::create_dir_all(&self.dir).map_err(|e| {
            HarnessError::Persistence(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let path = self
            .dir
            .join(RecordName::new(outcome.key, outcome.finished_at).file_name());
        let body = serde_json::to_vec_pretty(&record)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => HarnessError::Persistence(format!(
                    "{} already exists, refusing to overwrite",
                    path.display()
                )),
                _ => HarnessError::Persistence(format!("cannot write {}: {}", path.display(), e)),
            })?;
        file.write_all(&body)
            .map_err(|e| HarnessError::Persistence(format!("cannot write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Saved result");
        Ok(record)
    }

    /// Names of stored records for one key, newest first
    fn names(&self, key: RunKey) -> Result<Vec<RecordName>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<RecordName> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| RecordName::parse(&entry.file_name().to_string_lossy()))
            .filter(|name| name.key == key)
            .collect();
        names.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(names)
    }

    /// Up to `limit` most recent records for a key, newest first.
    /// Unreadable files are skipped with a warning.
    pub fn load(&self, test_type: TestType, rate: u32, limit: usize) -> Result<Vec<ResultRecord>> {
        let key = RunKey::new(test_type, rate);
        let mut records = Vec::new();

        for name in self.names(key)? {
            if records.len() >= limit {
                break;
            }
            let path = self.dir.join(name.file_name());
            match Self::read(&path) {
                Ok(record) => {
                    debug!(path = %path.display(), "Loaded result");
                    records.push(record);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable result"),
            }
        }

        if records.is_empty() {
            return Err(HarnessError::NotFound(key.to_string()));
        }
        Ok(records)
    }

    fn read(path: &Path) -> Result<ResultRecord> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Keys with at least one stored record, sorted
    pub fn keys(&self) -> Result<Vec<RunKey>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys: Vec<RunKey> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| RecordName::parse(&entry.file_name().to_string_lossy()))
            .map(|name| name.key)
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Delete all but the newest `retention` records of each matching key.
    /// Returns the removed file names.
    pub fn prune(
        &self,
        test_type: Option<TestType>,
        rate: Option<u32>,
        retention: usize,
    ) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for key in self.keys()? {
            if test_type.is_some_and(|t| t != key.test_type) || rate.is_some_and(|r| r != key.rate) {
                continue;
            }
            for name in self.names(key)?.into_iter().skip(retention) {
                let file_name = name.file_name();
                match fs::remove_file(self.dir.join(&file_name)) {
                    Ok(()) => removed.push(file_name),
                    Err(e) => warn!(file = %file_name, error = %e, "Failed to prune result"),
                }
            }
        }
        Ok(removed)
    }
}
