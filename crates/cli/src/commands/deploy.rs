//! Deploy a single load test

use anyhow::{bail, Result};
use clap::Args;
use harness_lib::{
    duration::parse_duration, results::RecordName, HarnessError, JobRunner, JobSpecBuilder,
    LogSink, RunOutcome, ScenarioOverrides, TestRunSpec, TestType, WaitPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

use super::Context;
use crate::output::{color_state, format_ms, print_info, print_success, print_table, print_warning};

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Test type (stress, spike, soak, load)
    #[arg(long = "type", short = 't')]
    pub test_type: TestType,

    /// Target requests per second
    #[arg(long, short = 'r')]
    pub rps: u32,

    /// Test duration (e.g. 30s, 5m, 1h); the scenario default when omitted.
    /// Not accepted for load tests, which use the ramp stages.
    #[arg(long, short = 'd', value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Wait for the job to finish
    #[arg(long)]
    pub wait: bool,

    /// Stream the k6 output while waiting (implies --wait)
    #[arg(long)]
    pub follow: bool,

    /// Save the run as a result record (implies --wait)
    #[arg(long, alias = "save")]
    pub save_results: bool,

    /// Stop waiting after this long; the job is left in place
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Base URL of the system under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// `app` label of the target deployments
    #[arg(long)]
    pub app_label: Option<String>,

    /// Spike: peak rate as a multiple of --rps
    #[arg(long)]
    pub spike_multiplier: Option<u32>,

    /// Spike: how long the peak is held
    #[arg(long, value_parser = parse_duration)]
    pub spike_duration: Option<Duration>,

    /// Load: ramp-up time
    #[arg(long, value_parser = parse_duration)]
    pub ramp_up: Option<Duration>,

    /// Load: time held at the target rate
    #[arg(long, value_parser = parse_duration)]
    pub sustain: Option<Duration>,

    /// Load: ramp-down time
    #[arg(long, value_parser = parse_duration)]
    pub ramp_down: Option<Duration>,
}

impl DeployArgs {
    fn waits(&self) -> bool {
        self.wait || self.follow || self.save_results
    }

    /// Reject flag combinations the builder would silently ignore
    pub fn check(&self) -> harness_lib::Result<()> {
        if self.test_type == TestType::Load && self.duration.is_some() {
            return Err(HarnessError::Input(
                "--duration does not apply to load tests; use --ramp-up, --sustain and --ramp-down"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn spec(&self, ctx: &Context) -> TestRunSpec {
        let mut spec = TestRunSpec::new(self.test_type, self.rps, &ctx.config)
            .with_duration(self.duration)
            .with_overrides(ScenarioOverrides {
                spike_multiplier: self.spike_multiplier,
                spike_duration: self.spike_duration,
                ramp_up: self.ramp_up,
                sustain: self.sustain,
                ramp_down: self.ramp_down,
            });
        if let Some(base_url) = &self.base_url {
            spec.base_url = base_url.clone();
        }
        if self.app_label.is_some() {
            spec.app_label = self.app_label.clone();
        }
        spec
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
    #[tabled(rename = "Requests")]
    requests: String,
    #[tabled(rename = "RPS")]
    achieved_rps: String,
    #[tabled(rename = "Errors")]
    error_rate: String,
    #[tabled(rename = "p95")]
    p95: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
}

impl OutcomeRow {
    fn from_outcome(outcome: &RunOutcome) -> Self {
        let elapsed = (outcome.finished_at - outcome.started_at).num_seconds();
        let dash = || "-".to_string();
        Self {
            job: outcome.job_name.clone(),
            state: color_state(outcome.terminal_state),
            elapsed: format!("{}s", elapsed),
            requests: outcome
                .summary
                .map(|s| s.http_reqs.count.to_string())
                .unwrap_or_else(dash),
            achieved_rps: outcome
                .summary
                .map(|s| format!("{:.2}", s.http_reqs.rate))
                .unwrap_or_else(dash),
            error_rate: outcome
                .summary
                .map(|s| format!("{:.2}%", s.http_req_failed.rate * 100.0))
                .unwrap_or_else(dash),
            p95: outcome
                .summary
                .map(|s| format_ms(s.http_req_duration.p95))
                .unwrap_or_else(dash),
            metrics: if outcome.snapshot.is_some() {
                "collected".to_string()
            } else {
                "unavailable".to_string()
            },
        }
    }
}

pub async fn run(ctx: &Context, args: &DeployArgs) -> Result<()> {
    args.check()?;
    let job = JobSpecBuilder::new(&ctx.config).build(&args.spec(ctx))?;
    let cluster = ctx.cluster().await?;

    let mut runner = JobRunner::new(cluster, &ctx.config);
    if args.follow {
        let sink: Arc<dyn LogSink> = Arc::new(|line: &str| println!("{}", line));
        runner = runner.with_log_sink(sink);
    }

    print_info(&format!(
        "Deploying {} ({} tier) to namespace {}",
        job.name, job.tier.name, job.namespace
    ));

    if !args.waits() {
        runner.submit(&job).await?;
        print_success(&format!("Submitted job {}", job.name));
        return Ok(());
    }

    let wait = WaitPolicy {
        stream_logs: args.follow,
        timeout: args.timeout,
    };
    let outcome = runner.run(&job, &wait).await?;

    print_table(&[OutcomeRow::from_outcome(&outcome)], &outcome, ctx.format);
    if outcome.snapshot.is_none() {
        print_warning("Resource metrics were not collected for this run");
    }

    if args.save_results {
        let store = ctx.store();
        let record = store.save(&outcome, None)?;
        let name = RecordName::new(record.key(), record.timestamp).file_name();
        print_success(&format!("Saved {}", store.dir().join(name).display()));
    }

    if !outcome.terminal_state.is_success() {
        bail!("Job {} finished {}", outcome.job_name, outcome.terminal_state);
    }
    Ok(())
}
