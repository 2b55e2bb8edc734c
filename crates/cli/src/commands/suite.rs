//! Run every (type, rate) combination as a suite

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Args;
use harness_lib::{
    duration::parse_duration, HarnessConfig, HarnessError, JobRunner, JobSpecBuilder,
    ResultStore, RunExecutor, RunKey, StructuredLogger, SuiteMode, SuiteRunner, TerminalState,
    TestRunSpec, TestType, WaitPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tracing::{info, warn};

use super::Context;
use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

#[derive(Debug, Args)]
pub struct SuiteArgs {
    /// Test type, a comma-separated list, or `all`
    #[arg(long = "type", short = 't', default_value = "all")]
    pub types: String,

    /// Rates to run, e.g. "10,50,100"
    #[arg(long, default_value = "10,50,100")]
    pub rps_levels: String,

    /// Seconds to wait between sequential runs
    #[arg(long, default_value_t = 60)]
    pub delay: u64,

    /// Start every run at once
    #[arg(long)]
    pub parallel: bool,

    /// Duration of each run; scenario defaults when omitted
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Per-run wait bound; the job's own bound when omitted
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Save a result record for each run that produced a summary
    #[arg(long, alias = "save")]
    pub save_results: bool,
}

/// `all`, or a list of type names separated by commas or whitespace
pub fn parse_types(input: &str) -> harness_lib::Result<Vec<TestType>> {
    if input.trim().eq_ignore_ascii_case("all") {
        return Ok(TestType::ALL.to_vec());
    }
    let mut types = Vec::new();
    for name in input.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()) {
        let test_type: TestType = name.parse()?;
        if !types.contains(&test_type) {
            types.push(test_type);
        }
    }
    Ok(types)
}

/// Rates separated by commas or whitespace
pub fn parse_rates(input: &str) -> harness_lib::Result<Vec<u32>> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| HarnessError::Input(format!("invalid rate '{}'", s)))
        })
        .collect()
}

/// Runs each key as a job on the cluster and waits for it
struct ClusterExecutor {
    config: HarnessConfig,
    builder: JobSpecBuilder,
    runner: JobRunner,
    duration: Option<Duration>,
    wait: WaitPolicy,
    store: Option<ResultStore>,
}

#[async_trait]
impl RunExecutor for ClusterExecutor {
    async fn execute(&self, key: RunKey) -> harness_lib::Result<TerminalState> {
        let spec = TestRunSpec::new(key.test_type, key.rate, &self.config).with_duration(self.duration);
        let job = self.builder.build(&spec)?;
        let outcome = self.runner.run(&job, &self.wait).await?;

        if let Some(store) = &self.store {
            match store.save(&outcome, None) {
                Ok(record) => info!(run = %key, state = %record.terminal_state, "Saved result"),
                Err(e) => warn!(run = %key, error = %e, "Result not saved"),
            }
        }
        Ok(outcome.terminal_state)
    }
}

#[derive(Tabled)]
struct FailedRow {
    #[tabled(rename = "Failed run")]
    key: String,
}

pub async fn run(ctx: &Context, args: &SuiteArgs) -> Result<()> {
    let types = parse_types(&args.types)?;
    let rates = parse_rates(&args.rps_levels)?;
    let plan = SuiteRunner::plan(&types, &rates)?;

    let mode = if args.parallel {
        SuiteMode::Parallel
    } else {
        SuiteMode::Sequential
    };
    print_info(&format!("Running {} test(s) ({:?})", plan.len(), mode));

    let executor = ClusterExecutor {
        config: ctx.config.clone(),
        builder: JobSpecBuilder::new(&ctx.config),
        runner: JobRunner::new(ctx.cluster().await?, &ctx.config),
        duration: args.duration,
        wait: WaitPolicy {
            stream_logs: false,
            timeout: args.timeout,
        },
        store: args.save_results.then(|| ctx.store()),
    };

    let result = SuiteRunner::new(Arc::new(executor))
        .with_delay(Duration::from_secs(args.delay))
        .with_mode(mode)
        .run_suite(&types, &rates)
        .await?;
    StructuredLogger::new(&ctx.config.namespace).log_suite_finished(&result);

    let rows: Vec<FailedRow> = result
        .failed_keys
        .iter()
        .map(|key| FailedRow {
            key: key.to_string(),
        })
        .collect();

    match ctx.format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table if !rows.is_empty() => print_table(&rows, &result, ctx.format),
        OutputFormat::Table => {}
    }

    if !result.is_success() {
        bail!("{} of {} run(s) failed", result.failed, result.total);
    }
    print_success(&format!("All {} run(s) passed", result.total));
    Ok(())
}
