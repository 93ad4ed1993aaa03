//! Tracescope CLI Binary
//!
//! Command-line interface for inspecting recorded browser traces.

use anyhow::Context;
use clap::Parser;
use tracescope::logging::init_logging;
use tracescope::tooling::{Cli, CliContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(&cli).context("Failed to load configuration")?;
    init_logging(Some(&context.config().logging)).context("Failed to initialize logging")?;

    let output = context.execute(&cli.command).await?;
    println!("{}", output);
    Ok(())
}
