//! Push-based source adapters
//!
//! A source adapter wraps one live collection and delivers the **complete
//! current record list** on every change, never a diff. Delivery is
//! fail-open: a broken source degrades to an empty snapshot with a warning,
//! so the other source's data keeps flowing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{RawRecord, SourceKind};
use crate::normalize;

/// One full-collection delivery from a source.
///
/// `received_at` doubles as the deterministic fallback clock for normalizing
/// records that lack timestamps: as long as the snapshot is the stored one,
/// re-normalization is stable.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub source: SourceKind,
    pub records: Vec<RawRecord>,
    pub received_at: DateTime<Utc>,
}

/// A live, push-based record source.
///
/// Implementations must deliver an initial snapshot promptly after
/// `subscribe` and a fresh full snapshot on every subsequent change.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which capture path this adapter feeds
    fn kind(&self) -> SourceKind;

    /// Start delivering snapshots into `events` until the returned handle is
    /// stopped or the receiver goes away.
    async fn subscribe(&self, events: mpsc::Sender<SourceSnapshot>) -> Result<SubscriptionHandle>;
}

/// Cancellation handle for one subscription. `stop` is idempotent.
pub struct SubscriptionHandle {
    source: SourceKind,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    pub fn new(source: SourceKind, task: JoinHandle<()>) -> Self {
        Self {
            source,
            task: Mutex::new(Some(task)),
        }
    }

    /// Cancel delivery. Safe to call any number of times.
    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                debug!(source = %self.source, "Subscription stopped");
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Internal state shared between a `MemorySource` and its delivery tasks
#[derive(Debug, Clone, Default)]
struct SourceState {
    revision: u64,
    failed: bool,
    records: Vec<RawRecord>,
}

/// In-memory live collection.
///
/// Doubles as the engine's test double and the CLI's file-backed source:
/// `set_records` replaces the collection and pushes a fresh snapshot
/// (creation time descending, the order the backing queries use) to every
/// active subscription; `inject_error` simulates a delivery failure, which
/// subscribers observe as an empty snapshot.
pub struct MemorySource {
    kind: SourceKind,
    state: watch::Sender<SourceState>,
}

impl MemorySource {
    pub fn new(kind: SourceKind) -> Self {
        let (state, _) = watch::channel(SourceState::default());
        Self { kind, state }
    }

    /// Replace the collection contents and notify all subscriptions
    pub fn set_records(&self, records: Vec<RawRecord>) {
        self.state.send_modify(|state| {
            state.revision += 1;
            state.failed = false;
            state.records = records;
        });
    }

    /// Simulate a transient delivery failure for the next notification
    pub fn inject_error(&self) {
        self.state.send_modify(|state| {
            state.revision += 1;
            state.failed = true;
        });
    }
}

#[async_trait]
impl SourceAdapter for MemorySource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn subscribe(&self, events: mpsc::Sender<SourceSnapshot>) -> Result<SubscriptionHandle> {
        let kind = self.kind;
        let mut state_rx = self.state.subscribe();

        let task = tokio::spawn(async move {
            loop {
                let (failed, mut records) = {
                    let state = state_rx.borrow_and_update();
                    (state.failed, state.records.clone())
                };

                let snapshot = if failed {
                    warn!(source = %kind, "Source delivery failed, substituting empty snapshot");
                    SourceSnapshot {
                        source: kind,
                        records: Vec::new(),
                        received_at: Utc::now(),
                    }
                } else {
                    sort_newest_first(&mut records);
                    SourceSnapshot {
                        source: kind,
                        records,
                        received_at: Utc::now(),
                    }
                };

                if events.send(snapshot).await.is_err() {
                    // Consumer went away; nothing left to deliver to.
                    break;
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        debug!(source = %kind, "Subscription started");
        Ok(SubscriptionHandle::new(kind, task))
    }
}

/// Order records by creation time descending, unstamped records last.
/// Ties keep insertion order.
fn sort_newest_first(records: &mut [RawRecord]) {
    records.sort_by_key(|record| {
        std::cmp::Reverse(normalize::record_created_at(record).unwrap_or(DateTime::<Utc>::MIN_UTC))
    });
}

/// Convenience for building adapters over trait objects
pub type DynSourceAdapter = Arc<dyn SourceAdapter>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    fn record(id: &str, created_at: &str) -> RawRecord {
        let mut fields: Map<String, Value> = Map::new();
        fields.insert("createdAt".to_string(), json!(created_at));
        RawRecord::new(id, fields)
    }

    async fn next_snapshot(rx: &mut mpsc::Receiver<SourceSnapshot>) -> SourceSnapshot {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_delivered() {
        let source = MemorySource::new(SourceKind::Manual);
        source.set_records(vec![record("a", "2024-05-01T10:00:00Z")]);

        let (tx, mut rx) = mpsc::channel(4);
        let _handle = source.subscribe(tx).await.unwrap();

        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.source, SourceKind::Manual);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[tokio::test]
    async fn test_updates_push_full_snapshots() {
        let source = MemorySource::new(SourceKind::Ocr);
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = source.subscribe(tx).await.unwrap();

        // Initial (empty) snapshot
        assert!(next_snapshot(&mut rx).await.records.is_empty());

        source.set_records(vec![
            record("a", "2024-05-01T10:00:00Z"),
            record("b", "2024-05-02T10:00:00Z"),
        ]);
        let snapshot = next_snapshot(&mut rx).await;
        assert_eq!(snapshot.records.len(), 2);
        // Newest first
        assert_eq!(snapshot.records[0].id, "b");
        assert_eq!(snapshot.records[1].id, "a");
    }

    #[tokio::test]
    async fn test_error_degrades_to_empty_snapshot() {
        let source = MemorySource::new(SourceKind::Manual);
        source.set_records(vec![record("a", "2024-05-01T10:00:00Z")]);

        let (tx, mut rx) = mpsc::channel(4);
        let _handle = source.subscribe(tx).await.unwrap();
        assert_eq!(next_snapshot(&mut rx).await.records.len(), 1);

        source.inject_error();
        assert!(next_snapshot(&mut rx).await.records.is_empty());

        // Recovery delivers data again
        source.set_records(vec![record("a", "2024-05-01T10:00:00Z")]);
        assert_eq!(next_snapshot(&mut rx).await.records.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let source = MemorySource::new(SourceKind::Manual);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = source.subscribe(tx).await.unwrap();
        let _ = next_snapshot(&mut rx).await;

        handle.stop();
        handle.stop();

        source.set_records(vec![record("a", "2024-05-01T10:00:00Z")]);
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        match outcome {
            Ok(None) => {}           // channel closed after abort
            Err(_) => {}             // nothing delivered
            Ok(Some(_)) => panic!("snapshot delivered after stop"),
        }
    }
}
