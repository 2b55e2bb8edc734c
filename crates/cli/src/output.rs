//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use harness_lib::{TerminalState, Trend};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows, or `json` as JSON
pub fn print_table<T: Tabled, J: Serialize + ?Sized>(rows: &[T], json: &J, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(json),
    }
}

pub fn print_json<J: Serialize + ?Sized>(value: &J) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize output: {}", e)),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Signed percentage with two decimals
pub fn format_pct(pct: f64) -> String {
    format!("{:+.2}%", pct)
}

/// Latency in milliseconds
pub fn format_ms(ms: f64) -> String {
    format!("{:.2}ms", ms)
}

/// Color a terminal state
pub fn color_state(state: TerminalState) -> String {
    let text = state.to_string();
    match state {
        TerminalState::Complete => text.green().to_string(),
        TerminalState::Failed => text.red().to_string(),
        TerminalState::TimedOut | TerminalState::Unknown => text.yellow().to_string(),
    }
}

/// Color a trend; lower latency and error rate are better
pub fn color_trend(trend: Trend) -> String {
    let text = trend.to_string();
    match trend {
        Trend::Improved => text.green().to_string(),
        Trend::Degraded => text.red().to_string(),
        Trend::Unchanged => text,
    }
}
