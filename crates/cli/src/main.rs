//! k6ctl - run and compare k6 load tests on Kubernetes
//!
//! Deploys load-test Jobs, waits for them, stores one result file per run
//! and compares stored results over time.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    cleanup::CleanupArgs, compare::QueryArgs, deploy::DeployArgs, report::ReportArgs,
    suite::SuiteArgs, Context,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// k6 load-test harness CLI
#[derive(Parser)]
#[command(name = "k6ctl")]
#[command(author, version, about = "Run and compare k6 load tests on Kubernetes", long_about = None)]
pub struct Cli {
    /// Namespace the load-test jobs run in
    #[arg(long, short, global = true, env = "K6_NAMESPACE")]
    pub namespace: Option<String>,

    /// Configuration file (default: ~/.config/k6-harness/config.yaml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding result files
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a load test job
    Deploy(DeployArgs),

    /// Remove load-test jobs, config maps and old results
    Cleanup(CleanupArgs),

    /// Compare the oldest and newest stored results
    Compare(QueryArgs),

    /// Write a markdown report over stored results
    Report(ReportArgs),

    /// Run every combination of test types and rates
    RunSuite(SuiteArgs),
}

#[tokio::main]
async fn main() {
    // usage errors exit 1 like every other failure; help and version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let harness_config = config::load(&config::Overrides {
        config: cli.config,
        namespace: cli.namespace,
        results_dir: cli.results_dir,
    })?;
    let ctx = Context {
        config: harness_config,
        format: cli.format,
        kubeconfig: cli.kubeconfig,
        kube_context: cli.context,
    };

    match &cli.command {
        Commands::Deploy(args) => commands::deploy::run(&ctx, args).await,
        Commands::Cleanup(args) => commands::cleanup::run(&ctx, args).await,
        Commands::Compare(args) => commands::compare::run(&ctx, args),
        Commands::Report(args) => commands::report::run(&ctx, args),
        Commands::RunSuite(args) => commands::suite::run(&ctx, args).await,
    }
}
