//! CLI argument definitions using clap
//!
//! This module contains the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reckon - Merge manual and scanned expenses into one feed
#[derive(Parser)]
#[command(name = "reckon")]
#[command(about = "Multi-source transaction reconciliation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Engine config file (TOML); built-in defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile two snapshot files once and print the merged feed
    Merge {
        /// JSON snapshot of the manual-entry collection
        #[arg(long)]
        manual: PathBuf,

        /// JSON snapshot of the receipt-scanner collection
        #[arg(long)]
        scanned: PathBuf,

        /// Print the feed as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Print expense/income totals after the feed
        #[arg(long)]
        summary: bool,
    },

    /// Watch both snapshot files and reprint the feed as they change
    Watch {
        /// JSON snapshot of the manual-entry collection
        #[arg(long)]
        manual: PathBuf,

        /// JSON snapshot of the receipt-scanner collection
        #[arg(long)]
        scanned: PathBuf,

        /// Poll interval in seconds
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}
