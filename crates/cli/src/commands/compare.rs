//! Compare the oldest and newest stored results of a key

use anyhow::{Context as _, Result};
use clap::Args;
use harness_lib::{compare, compare::MetricTrend, HarnessError, ResultRecord, TestType};
use tabled::Tabled;

use super::Context;
use crate::output::{color_trend, format_pct, print_info, print_table};

/// Selects the stored results of one (type, rate) key
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Test type (stress, spike, soak, load)
    #[arg(long = "type", short = 't')]
    pub test_type: TestType,

    /// Target requests per second
    #[arg(long, short = 'r')]
    pub rps: u32,

    /// How many of the most recent results to consider
    #[arg(long, alias = "limit", default_value_t = 10)]
    pub last: usize,
}

impl QueryArgs {
    /// Newest first. No matching results is an error.
    pub fn load(&self, ctx: &Context) -> Result<Vec<ResultRecord>> {
        let store = ctx.store();
        store
            .load(self.test_type, self.rps, self.last.max(1))
            .map_err(|e| match e {
                HarnessError::NotFound(key) => anyhow::anyhow!(
                    "No results found for {} in {}",
                    key,
                    store.dir().display()
                ),
                other => anyhow::Error::new(other),
            })
            .context("Failed to load results")
    }
}

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Oldest")]
    oldest: String,
    #[tabled(rename = "Newest")]
    newest: String,
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Trend")]
    trend: String,
}

impl TrendRow {
    fn new(metric: &'static str, t: &MetricTrend, precision: usize) -> Self {
        Self {
            metric,
            oldest: format!("{:.*}", precision, t.old),
            newest: format!("{:.*}", precision, t.new),
            change: format_pct(t.delta_pct),
            trend: color_trend(t.trend),
        }
    }
}

pub fn run(ctx: &Context, args: &QueryArgs) -> Result<()> {
    let records = args.load(ctx)?;
    let trend = compare(&records)?;

    print_info(&format!(
        "{}-{}rps: {} run(s), oldest to newest",
        trend.test_type, trend.rate, trend.runs
    ));
    let rows = vec![
        TrendRow::new("p95 latency (ms)", &trend.p95, 2),
        TrendRow::new("Error rate", &trend.error_rate, 4),
    ];
    print_table(&rows, &trend, ctx.format);
    Ok(())
}
