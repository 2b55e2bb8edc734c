//! k6-sidecar - in-job companion of a k6 load test
//!
//! The init container runs `install`, the k6 container runs `generate -- k6 ...`
//! and the collector container runs `collect`. The two long-running roles talk
//! only through files on the shared volume.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harness_lib::{
    sidecar::{
        read_profile, Collector, CollectorSettings, Generator, GeneratorSettings, SharedVolume,
        SIDECAR_BINARY,
    },
    ClusterApi, HarnessError, HealthRegistry, KubeCluster, SidecarMetrics,
};
use k6_sidecar::{api, config::SidecarConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command as Process;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SIDECAR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "k6-sidecar")]
#[command(author, version, about = "In-job sidecar for k6 load-test runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy this binary into the shared volume
    Install {
        /// Destination directory
        #[arg(long, default_value = "/shared/bin")]
        dest: PathBuf,
    },

    /// Run k6, signal the collector and print the result envelope
    Generate {
        /// The k6 command line, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Wait for the collect signal and sample resource usage
    Collect,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries k6 output and the result envelope
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(version = SIDECAR_VERSION, "Starting k6-sidecar");

    match cli.command {
        Command::Install { dest } => install(&dest).await,
        Command::Generate { command } => {
            let config = SidecarConfig::load()?;
            let exit_code = generate(&config, &command).await?;
            std::process::exit(exit_code);
        }
        Command::Collect => {
            let config = SidecarConfig::load()?;
            collect(&config).await
        }
    }
}

async fn install(dest: &Path) -> Result<()> {
    let source = std::env::current_exe().context("Could not locate the running binary")?;
    let target = dest.join(SIDECAR_BINARY);

    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    tokio::fs::copy(&source, &target)
        .await
        .with_context(|| format!("Failed to copy sidecar to {}", target.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).await?;
    }

    info!(target = %target.display(), "Installed sidecar");
    Ok(())
}

async fn cluster() -> Result<Arc<dyn ClusterApi>> {
    let cluster = KubeCluster::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    Ok(Arc::new(cluster))
}

/// Returns the exit code of the wrapped command
async fn generate(config: &SidecarConfig, command: &[String]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .context("No command given to generate")?;

    let profile = read_profile(&config.profile_path).await?;
    info!(
        test_type = %profile.test_type,
        target_rate = profile.target_rate,
        total_secs = profile.total_duration_secs,
        "Loaded load profile"
    );

    let generator = Generator::new(
        cluster().await?,
        SharedVolume::new(&config.shared_dir),
        &config.namespace,
        &config.nodepool_label,
    )
    .with_app_label(config.app_label.clone())
    .with_settings(GeneratorSettings {
        metrics_wait: config.metrics_wait(),
        poll_interval: config.poll_interval(),
        ..Default::default()
    });

    let load = async {
        let status = Process::new(program).args(args).status().await?;
        // killed by a signal
        Ok::<_, HarnessError>(status.code().unwrap_or(1))
    };

    let report = generator.run(&profile, load).await?;
    if let Some(e) = &report.load_error {
        error!(program = %program, error = %e, "Could not run the load command");
    }
    if !report.metrics_done {
        warn!("Finished without a collector acknowledgement");
    }
    info!(
        exit_code = report.exit_code,
        early_exit = report.early_exit,
        phases = ?report.phases,
        "Generator finished"
    );

    println!("{}", report.envelope.render()?);
    Ok(report.exit_code)
}

async fn collect(config: &SidecarConfig) -> Result<()> {
    let health_registry = HealthRegistry::new();
    let metrics = SidecarMetrics::new().context("Failed to register sidecar metrics")?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let collector = Collector::new(
        cluster().await?,
        SharedVolume::new(&config.shared_dir),
        &config.namespace,
        &config.nodepool_label,
        health_registry,
        metrics,
    )
    .with_settings(CollectorSettings {
        max_wait: config.collector_max_wait(),
        poll_interval: config.poll_interval(),
    });

    tokio::select! {
        report = collector.run() => {
            let report = report?;
            info!(
                phases = ?report.phases,
                sampled = report.snapshot.is_some(),
                "Collector finished"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            error!("Interrupted before collection finished");
        }
    }

    api_handle.abort();
    Ok(())
}
