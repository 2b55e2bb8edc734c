//! Trend comparison and markdown reporting over stored results

use crate::error::{HarnessError, Result};
use crate::models::{MetricsSnapshot, ResultRecord, UsageSample};
use serde::Serialize;
use std::fmt::{self, Write};

/// Added to a zero baseline so the percentage stays finite
const ZERO_BASELINE_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Improved,
    Degraded,
    Unchanged,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::Improved => "Improved",
            Trend::Degraded => "Degraded",
            Trend::Unchanged => "Unchanged",
        };
        f.write_str(s)
    }
}

/// Change of one lower-is-better metric between the oldest and newest record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricTrend {
    pub old: f64,
    pub new: f64,
    pub delta_pct: f64,
    pub trend: Trend,
}

impl MetricTrend {
    pub fn between(old: f64, new: f64) -> Self {
        let base = if old == 0.0 { ZERO_BASELINE_EPSILON } else { old };
        let delta_pct = (new - old) / base * 100.0;
        let trend = if delta_pct < 0.0 {
            Trend::Improved
        } else if delta_pct > 0.0 {
            Trend::Degraded
        } else {
            Trend::Unchanged
        };
        Self {
            old,
            new,
            delta_pct,
            trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub test_type: String,
    pub rate: u32,
    /// Records in the window
    pub runs: usize,
    pub p95: MetricTrend,
    pub error_rate: MetricTrend,
}

/// Compare the oldest and newest of `records` (ordered newest first)
pub fn compare(records: &[ResultRecord]) -> Result<TrendReport> {
    let (newest, oldest) = match (records.first(), records.last()) {
        (Some(newest), Some(oldest)) => (newest, oldest),
        _ => return Err(HarnessError::Input("no records to compare".to_string())),
    };

    Ok(TrendReport {
        test_type: newest.test_type.to_string(),
        rate: newest.rate,
        runs: records.len(),
        p95: MetricTrend::between(oldest.p95(), newest.p95()),
        error_rate: MetricTrend::between(oldest.error_rate(), newest.error_rate()),
    })
}

fn format_pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

fn usage_totals(samples: &[UsageSample]) -> (u64, u64) {
    samples
        .iter()
        .fold((0, 0), |(cpu, mem), s| (cpu + s.cpu_millicores, mem + s.memory_bytes))
}

fn write_usage_table(
    out: &mut String,
    title: &str,
    entries: &std::collections::BTreeMap<String, Vec<UsageSample>>,
) -> fmt::Result {
    if entries.is_empty() {
        return Ok(());
    }
    writeln!(out, "### {}\n", title)?;
    writeln!(out, "| Name | Samples | CPU (m) | Memory (MiB) |")?;
    writeln!(out, "|------|---------|---------|--------------|")?;
    for (name, samples) in entries {
        let (cpu, memory) = usage_totals(samples);
        writeln!(
            out,
            "| {} | {} | {} | {:.1} |",
            name,
            samples.len(),
            cpu,
            memory as f64 / (1024.0 * 1024.0)
        )?;
    }
    writeln!(out)
}

fn write_snapshot(out: &mut String, snapshot: &MetricsSnapshot) -> fmt::Result {
    writeln!(
        out,
        "## Resource usage\n\nSampled at {}.\n",
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    write_usage_table(out, "Deployments", &snapshot.deployments)?;
    write_usage_table(out, "Node pools", &snapshot.nodepools)
}

fn render(records: &[ResultRecord]) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    let newest = &records[0];

    writeln!(out, "# Load test report: {}\n", newest.key())?;
    writeln!(
        out,
        "{} run(s), newest {}.\n",
        records.len(),
        newest.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    writeln!(out, "## Runs\n")?;
    writeln!(
        out,
        "| Timestamp | State | Requests | Achieved RPS | Error rate | p50 (ms) | p95 (ms) | p99 (ms) |"
    )?;
    writeln!(
        out,
        "|-----------|-------|----------|--------------|------------|----------|----------|----------|"
    )?;
    for record in records {
        writeln!(
            out,
            "| {} | {} | {} | {:.2} | {:.2}% | {:.2} | {:.2} | {:.2} |",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.terminal_state,
            record.total_requests(),
            record.achieved_rate(),
            record.error_rate() * 100.0,
            record.p50(),
            record.p95(),
            record.p99()
        )?;
    }
    writeln!(out)?;

    if records.len() >= 2 {
        if let Ok(trend) = compare(records) {
            writeln!(out, "## Trend (oldest to newest)\n")?;
            writeln!(out, "| Metric | Oldest | Newest | Change | Trend |")?;
            writeln!(out, "|--------|--------|--------|--------|-------|")?;
            writeln!(
                out,
                "| p95 latency (ms) | {:.2} | {:.2} | {} | {} |",
                trend.p95.old,
                trend.p95.new,
                format_pct(trend.p95.delta_pct),
                trend.p95.trend
            )?;
            writeln!(
                out,
                "| Error rate | {:.4} | {:.4} | {} | {} |",
                trend.error_rate.old,
                trend.error_rate.new,
                format_pct(trend.error_rate.delta_pct),
                trend.error_rate.trend
            )?;
            writeln!(out)?;
        }
    }

    if let Some(snapshot) = &newest.resources {
        write_snapshot(&mut out, snapshot)?;
    }

    Ok(out)
}

/// Render a markdown report for `records` (ordered newest first)
pub fn report(records: &[ResultRecord]) -> Result<String> {
    if records.is_empty() {
        return Err(HarnessError::Input("no records to report".to_string()));
    }
    render(records).map_err(|e| HarnessError::Persistence(format!("cannot render report: {}", e)))
}
