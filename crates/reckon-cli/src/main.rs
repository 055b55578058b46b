//! Reckon CLI - Multi-source transaction reconciliation
//!
//! Usage:
//!   reckon merge --manual manual.json --scanned scanned.json
//!   reckon merge --manual manual.json --scanned scanned.json --json --summary
//!   reckon watch --manual manual.json --scanned scanned.json --interval 2

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Merge {
            manual,
            scanned,
            json,
            summary,
        } => commands::cmd_merge(&config, &manual, &scanned, json, summary),
        Commands::Watch {
            manual,
            scanned,
            interval,
        } => commands::cmd_watch(config, manual, scanned, interval).await,
    }
}
