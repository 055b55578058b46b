//! Command implementations for the Reckon CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use reckon_core::{
    reconcile_snapshots, EngineConfig, FeedSummary, MemorySource, RawRecord, Reconciler,
    SnapshotInput, SourceKind, Transaction,
};

/// Resolve the engine config: file (if given) over defaults, env on top
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

/// Read a snapshot fixture: a JSON array of raw documents
pub fn load_snapshot(path: &Path) -> Result<Vec<RawRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    RawRecord::parse_array(&text).with_context(|| format!("parsing {}", path.display()))
}

/// One-shot reconciliation of two snapshot files
pub fn cmd_merge(
    config: &EngineConfig,
    manual_path: &Path,
    scanned_path: &Path,
    as_json: bool,
    with_summary: bool,
) -> Result<()> {
    let manual = load_snapshot(manual_path)?;
    let scanned = load_snapshot(scanned_path)?;

    let now = Utc::now();
    let inputs = snapshot_inputs(config, &manual, &scanned, now)?;
    let feed = reconcile_snapshots(&inputs, config);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else {
        print_feed(&feed);
    }
    if with_summary {
        print_summary(&FeedSummary::from_feed(&feed));
    }
    Ok(())
}

/// Poll both snapshot files and feed changes through a live reconciler
pub async fn cmd_watch(
    config: EngineConfig,
    manual_path: PathBuf,
    scanned_path: PathBuf,
    interval_secs: u64,
) -> Result<()> {
    let manual = Arc::new(MemorySource::new(SourceKind::Manual));
    let scanner = Arc::new(MemorySource::new(SourceKind::Ocr));
    let reconciler = Reconciler::new(config, manual.clone(), scanner.clone())?;

    let mut feed_rx = reconciler.subscribe();
    reconciler.start().await?;

    let poller = tokio::spawn({
        let manual = manual.clone();
        let scanner = scanner.clone();
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            let mut last_manual = None;
            let mut last_scanned = None;
            loop {
                ticker.tick().await;
                refresh_source(&manual, &manual_path, &mut last_manual);
                refresh_source(&scanner, &scanned_path, &mut last_scanned);
            }
        }
    });

    info!("Watching snapshots, press Ctrl-C to stop");
    loop {
        tokio::select! {
            received = feed_rx.recv() => match received {
                Ok(feed) => {
                    println!();
                    print_feed(&feed);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} stale feed emissions", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    reconciler.stop().await;
    info!("Watch stopped");
    Ok(())
}

/// Re-read one snapshot file, pushing only on change.
///
/// Read or parse failures degrade the source (empty snapshot) instead of
/// killing the watch; the next good read recovers.
fn refresh_source(source: &MemorySource, path: &Path, last_contents: &mut Option<String>) {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            if last_contents.as_deref() == Some(text.as_str()) {
                return;
            }
            match RawRecord::parse_array(&text) {
                Ok(records) => {
                    source.set_records(records);
                    *last_contents = Some(text);
                }
                Err(err) => {
                    warn!("Unparseable snapshot {}: {}", path.display(), err);
                    source.inject_error();
                    *last_contents = None;
                }
            }
        }
        Err(err) => {
            warn!("Unreadable snapshot {}: {}", path.display(), err);
            source.inject_error();
            *last_contents = None;
        }
    }
}

/// Map the two loaded files onto the configured precedence order
fn snapshot_inputs<'a>(
    config: &EngineConfig,
    manual: &'a [RawRecord],
    scanned: &'a [RawRecord],
    now: DateTime<Utc>,
) -> Result<Vec<SnapshotInput<'a>>> {
    config
        .precedence
        .iter()
        .map(|kind| {
            let records = match kind {
                SourceKind::Manual => manual,
                SourceKind::Ocr => scanned,
                other => bail!("No snapshot file for configured source {}", other),
            };
            Ok(SnapshotInput {
                source: *kind,
                records,
                received_at: now,
            })
        })
        .collect()
}

fn print_feed(feed: &[Transaction]) {
    if feed.is_empty() {
        println!("(no transactions)");
        return;
    }

    println!(
        "{:<12} {:<8} {:>12} {:<18} {}",
        "DATE", "SOURCE", "AMOUNT", "CATEGORY", "TITLE"
    );
    for tx in feed {
        println!(
            "{:<12} {:<8} {:>12.2} {:<18} {}",
            tx.date.to_string(),
            tx.source.as_str(),
            tx.amount,
            tx.category,
            tx.title
        );
    }
}

fn print_summary(summary: &FeedSummary) {
    println!();
    println!("Transactions:   {}", summary.count);
    println!("Total expenses: {:.2}", summary.total_expenses);
    println!("Total income:   {:.2}", summary.total_income);
    match summary.savings_rate {
        Some(rate) => println!("Savings rate:   {:.1}%", rate),
        None => println!("Savings rate:   n/a"),
    }

    if !summary.by_category.is_empty() {
        println!();
        println!("Spending by category:");
        let mut categories: Vec<(&String, &f64)> = summary.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.total_cmp(a.1));
        for (category, total) in categories {
            println!("  {:<18} {:>12.2}", category, total);
        }
    }
}
