//! Remove harness-managed jobs, config maps and old result files

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{ArgGroup, Args};
use harness_lib::{
    clean, duration::parse_age, CleanupCandidate, CleanupFilter, CleanupReport, CleanupScope,
    TestType,
};
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;

use super::Context;
use crate::output::{print_info, print_success, print_table, print_warning};

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("scope").args(["all", "jobs", "completed", "failed"])))]
pub struct CleanupArgs {
    /// Jobs and their config maps (default); also prunes old result files
    #[arg(long)]
    pub all: bool,

    /// Jobs only, any status
    #[arg(long, alias = "jobs-only")]
    pub jobs: bool,

    /// Completed jobs only
    #[arg(long)]
    pub completed: bool,

    /// Failed jobs only
    #[arg(long)]
    pub failed: bool,

    /// Only resources older than this (e.g. 30m, 2h, 1d)
    #[arg(long, value_parser = parse_age)]
    pub older_than: Option<Duration>,

    /// Only this test type
    #[arg(long = "type", short = 't')]
    pub test_type: Option<TestType>,

    /// Only this rate
    #[arg(long, short = 'r')]
    pub rps: Option<u32>,

    /// List what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,

    /// Keep result files even with --all
    #[arg(long)]
    pub preserve_results: bool,
}

impl CleanupArgs {
    pub fn filter(&self) -> CleanupFilter {
        let scope = if self.jobs {
            CleanupScope::JobsOnly
        } else if self.completed {
            CleanupScope::CompletedOnly
        } else if self.failed {
            CleanupScope::FailedOnly
        } else {
            CleanupScope::All
        };
        CleanupFilter {
            scope,
            older_than: self.older_than,
            test_type: self.test_type,
            rate: self.rps,
        }
    }

    fn prunes_results(&self) -> bool {
        self.all && !self.preserve_results
    }
}

#[derive(Tabled, Serialize)]
struct CandidateRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
}

impl CandidateRow {
    fn new(candidate: &CleanupCandidate, report: &CleanupReport, dry_run: bool) -> Self {
        let action = match report.failure(candidate) {
            Some(error) => format!("failed: {}", error),
            None if dry_run => "would delete".to_string(),
            None => "deleted".to_string(),
        };
        Self {
            kind: candidate.kind.to_string(),
            name: candidate.name.clone(),
            action,
        }
    }
}

pub async fn run(ctx: &Context, args: &CleanupArgs) -> Result<()> {
    let filter = args.filter();
    let cluster = ctx.cluster().await?;
    let namespace = ctx.config.namespace.as_str();

    let report = clean(cluster.as_ref(), namespace, &filter, args.dry_run, Utc::now()).await?;
    let mut rows: Vec<CandidateRow> = report
        .selected
        .iter()
        .map(|c| CandidateRow::new(c, &report, args.dry_run))
        .collect();

    if args.prunes_results() {
        if args.dry_run {
            print_info("Dry run: result files are not pruned");
        } else {
            let pruned = ctx
                .store()
                .prune(args.test_type, args.rps, ctx.config.retention)?;
            rows.extend(pruned.into_iter().map(|name| CandidateRow {
                kind: "result".to_string(),
                name,
                action: "pruned".to_string(),
            }));
        }
    }

    if rows.is_empty() {
        print_warning(&format!("No matching resources found in namespace {}", namespace));
        bail!("nothing to clean up");
    }

    print_table(&rows, &rows, ctx.format);
    if !report.is_complete() {
        bail!(
            "{} of {} resource(s) could not be removed",
            report.failed.len(),
            report.selected.len()
        );
    }
    if args.dry_run {
        print_info(&format!("{} resource(s) would be removed", rows.len()));
    } else {
        print_success(&format!("Removed {} resource(s)", rows.len()));
    }
    Ok(())
}
