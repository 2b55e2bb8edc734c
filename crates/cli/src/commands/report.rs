//! Markdown report over stored results

use anyhow::{Context as _, Result};
use clap::Args;
use harness_lib::report;
use std::path::PathBuf;

use super::compare::QueryArgs;
use super::Context;
use crate::output::print_success;

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Write the report to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(ctx: &Context, args: &ReportArgs) -> Result<()> {
    let records = args.query.load(ctx)?;
    let document = report(&records)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &document)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            print_success(&format!("Wrote report to {}", path.display()));
        }
        None => print!("{}", document),
    }
    Ok(())
}
