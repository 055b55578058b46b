//! Two-source reconciliation
//!
//! The [`Reconciler`] owns the two most-recent full snapshots (one per
//! source) and recomputes the merged feed from scratch whenever either side
//! pushes: concatenate in precedence order, normalize, drop near-duplicates,
//! sort by date descending, emit. There is no incremental diffing; a full
//! recomputation per push keeps the engine trivially correct at interactive
//! feed sizes.
//!
//! Lifecycle is `Idle -> Subscribed -> Stopped`, with `Stopped` terminal.
//! One mutex guards the state and both snapshot buffers for the whole
//! replace/normalize/dedup/sort/emit sequence, so a snapshot from one source
//! can never interleave with the other mid-computation, and a snapshot still
//! in flight when `stop` returns is dropped rather than processed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dedup::DuplicateDetector;
use crate::error::{Error, Result};
use crate::models::{RawRecord, SourceKind, Transaction};
use crate::normalize;
use crate::source::{DynSourceAdapter, SourceSnapshot, SubscriptionHandle};

/// Immutable merged feed handed to subscribers
pub type TransactionFeed = Arc<Vec<Transaction>>;

/// Reconciler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No subscriptions active
    Idle,
    /// Both source adapters active
    Subscribed,
    /// Terminal; both subscriptions cancelled, no further emissions
    Stopped,
}

/// One source's contribution to a recomputation
pub struct SnapshotInput<'a> {
    pub source: SourceKind,
    pub records: &'a [RawRecord],
    /// Fallback clock for records without timestamps
    pub received_at: DateTime<Utc>,
}

/// The full recomputation: normalize the concatenated inputs, keep the first
/// member of every duplicate cluster, sort by date descending.
///
/// `inputs` must already be in precedence order; that order is the duplicate
/// tie-break. The sort is stable and uses the date alone, so same-date rows
/// keep their concatenation order.
pub fn reconcile_snapshots(
    inputs: &[SnapshotInput<'_>],
    config: &EngineConfig,
) -> Vec<Transaction> {
    let detector = DuplicateDetector::new(config.dedup());

    let mut candidates = Vec::new();
    for input in inputs {
        for record in input.records {
            candidates.push(normalize::normalize_record(
                record,
                input.source,
                input.received_at,
            ));
        }
    }
    let total = candidates.len();

    let mut accepted = detector.filter_duplicates(candidates);
    accepted.sort_by(|a, b| b.date.cmp(&a.date));

    debug!(
        candidates = total,
        accepted = accepted.len(),
        "Recomputed merged feed"
    );
    accepted
}

/// Latest stored delivery from one source
struct StoredSnapshot {
    records: Vec<RawRecord>,
    received_at: DateTime<Utc>,
}

/// State guarded by the single reconciliation mutex
struct Inner {
    state: ReconcilerState,
    /// Indexed by precedence position
    snapshots: [Option<StoredSnapshot>; 2],
    handles: Vec<SubscriptionHandle>,
}

/// Fan-in merge operator over two push-based sources.
pub struct Reconciler {
    config: EngineConfig,
    /// In precedence order
    adapters: Vec<DynSourceAdapter>,
    inner: Arc<Mutex<Inner>>,
    feed: broadcast::Sender<TransactionFeed>,
}

impl Reconciler {
    /// Build a reconciler over two adapters.
    ///
    /// The adapters' source kinds must match `config.precedence` (in either
    /// order); anything else is a startup misconfiguration and fails here,
    /// never at runtime.
    pub fn new(
        config: EngineConfig,
        first: DynSourceAdapter,
        second: DynSourceAdapter,
    ) -> Result<Self> {
        config.validate()?;

        if first.kind() == second.kind() {
            return Err(Error::Config(format!(
                "Both adapters feed {}; sources must differ",
                first.kind()
            )));
        }
        let mut adapters = vec![first, second];
        for adapter in &adapters {
            if !config.precedence.contains(&adapter.kind()) {
                return Err(Error::Config(format!(
                    "Adapter source {} is not in the configured precedence",
                    adapter.kind()
                )));
            }
        }
        // Subscribe and concatenate in precedence order
        adapters.sort_by_key(|adapter| {
            config
                .precedence
                .iter()
                .position(|kind| *kind == adapter.kind())
        });

        let (feed, _) = broadcast::channel(config.channel_capacity);
        Ok(Self {
            config,
            adapters,
            inner: Arc::new(Mutex::new(Inner {
                state: ReconcilerState::Idle,
                snapshots: [None, None],
                handles: Vec::new(),
            })),
            feed,
        })
    }

    /// Receive every future emission of the merged feed.
    ///
    /// At-least-once per recomputation; a lagging receiver may observe gaps
    /// but always ends on the newest feed.
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionFeed> {
        self.feed.subscribe()
    }

    pub async fn state(&self) -> ReconcilerState {
        self.inner.lock().await.state
    }

    /// Subscribe to both sources and start the reconciliation loop.
    ///
    /// Idempotent; calling it on a stopped reconciler is a no-op because
    /// `Stopped` is terminal.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            ReconcilerState::Subscribed => return Ok(()),
            ReconcilerState::Stopped => {
                debug!("start() on a stopped reconciler is a no-op");
                return Ok(());
            }
            ReconcilerState::Idle => {}
        }

        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity);
        for adapter in &self.adapters {
            match adapter.subscribe(events_tx.clone()).await {
                Ok(handle) => inner.handles.push(handle),
                Err(err) => {
                    for handle in inner.handles.drain(..) {
                        handle.stop();
                    }
                    return Err(err);
                }
            }
        }
        inner.state = ReconcilerState::Subscribed;
        info!(
            primary = %self.adapters[0].kind(),
            secondary = %self.adapters[1].kind(),
            "Reconciler subscribed"
        );

        tokio::spawn(run_loop(
            events_rx,
            Arc::clone(&self.inner),
            self.feed.clone(),
            self.config.clone(),
        ));
        Ok(())
    }

    /// Cancel both subscriptions and tear down the snapshot buffers.
    ///
    /// Idempotent. After this returns no further emission occurs, even for a
    /// snapshot that was already queued.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ReconcilerState::Stopped {
            return;
        }
        for handle in inner.handles.drain(..) {
            handle.stop();
        }
        inner.snapshots = [None, None];
        inner.state = ReconcilerState::Stopped;
        info!("Reconciler stopped");
    }
}

/// Single-consumer fan-in loop: one snapshot is fully processed (and its
/// emission sent) before the next is looked at.
async fn run_loop(
    mut events: mpsc::Receiver<SourceSnapshot>,
    inner: Arc<Mutex<Inner>>,
    feed: broadcast::Sender<TransactionFeed>,
    config: EngineConfig,
) {
    while let Some(snapshot) = events.recv().await {
        let mut guard = inner.lock().await;
        if guard.state != ReconcilerState::Subscribed {
            debug!(source = %snapshot.source, "Dropping snapshot received after stop");
            break;
        }

        let Some(slot) = config
            .precedence
            .iter()
            .position(|kind| *kind == snapshot.source)
        else {
            warn!(source = %snapshot.source, "Snapshot from unconfigured source, ignoring");
            continue;
        };

        guard.snapshots[slot] = Some(StoredSnapshot {
            records: snapshot.records,
            received_at: snapshot.received_at,
        });

        let inputs: Vec<SnapshotInput<'_>> = config
            .precedence
            .iter()
            .zip(guard.snapshots.iter())
            .filter_map(|(kind, stored)| {
                stored.as_ref().map(|snapshot| SnapshotInput {
                    source: *kind,
                    records: &snapshot.records,
                    received_at: snapshot.received_at,
                })
            })
            .collect();

        let transactions = reconcile_snapshots(&inputs, &config);
        // Emission happens under the same lock as the state check, so stop()
        // returning guarantees silence. No receivers is not an error.
        let _ = feed.send(Arc::new(transactions));
    }
    debug!("Reconciliation loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::{json, Map, Value};

    fn doc(id: &str, fields: serde_json::Value) -> RawRecord {
        let map: Map<String, Value> = fields.as_object().cloned().unwrap_or_default();
        RawRecord::new(id, map)
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).single().unwrap()
    }

    fn run(manual: &[RawRecord], scanned: &[RawRecord]) -> Vec<Transaction> {
        let config = EngineConfig::default();
        reconcile_snapshots(
            &[
                SnapshotInput {
                    source: SourceKind::Manual,
                    records: manual,
                    received_at: received(),
                },
                SnapshotInput {
                    source: SourceKind::Ocr,
                    records: scanned,
                    received_at: received(),
                },
            ],
            &config,
        )
    }

    #[test]
    fn test_cross_source_duplicate_keeps_manual_title() {
        let manual = [doc(
            "m1",
            json!({"title": "Swiggy order", "amount": 250, "date": "2024-05-01"}),
        )];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Receipt from Swiggy", "totalAmount": 250.00,
                   "createdAt": "2024-05-01T19:00:00Z"}),
        )];

        let feed = run(&manual, &scanned);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Swiggy order");
        assert_eq!(feed[0].id, "manual:m1");
    }

    #[test]
    fn test_amount_mismatch_keeps_both() {
        let manual = [doc(
            "m1",
            json!({"title": "Lunch", "amount": 250, "date": "2024-05-01"}),
        )];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Dinner", "totalAmount": 500,
                   "createdAt": "2024-05-01T20:00:00Z"}),
        )];

        assert_eq!(run(&manual, &scanned).len(), 2);
    }

    #[test]
    fn test_similar_titles_cluster() {
        let manual = [doc(
            "m1",
            json!({"title": "Coffee", "amount": 100.00, "date": "2024-05-02"}),
        )];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Coffee Shop Receipt", "totalAmount": 100.00,
                   "createdAt": "2024-05-02T09:00:00Z"}),
        )];

        let feed = run(&manual, &scanned);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].source, SourceKind::Manual);
    }

    #[test]
    fn test_one_empty_source_passes_other_through() {
        let scanned: Vec<RawRecord> = (0..5)
            .map(|i| {
                doc(
                    &format!("s{i}"),
                    json!({"merchantName": format!("Store {i}"), "totalAmount": 10 + i,
                           "createdAt": format!("2024-05-0{}T10:00:00Z", i + 1)}),
                )
            })
            .collect();

        let feed = run(&[], &scanned);
        assert_eq!(feed.len(), 5);
        assert!(feed.iter().all(|tx| tx.source == SourceKind::Ocr));
    }

    #[test]
    fn test_feed_sorted_date_descending() {
        let manual = [
            doc("m1", json!({"title": "Old", "amount": 1, "date": "2024-04-01"})),
            doc("m2", json!({"title": "New", "amount": 2, "date": "2024-05-05"})),
            doc("m3", json!({"title": "Mid", "amount": 3, "date": "2024-05-01"})),
        ];

        let feed = run(&manual, &[]);
        let dates: Vec<NaiveDate> = feed.iter().map(|tx| tx.date).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert_eq!(feed[0].title, "New");
    }

    #[test]
    fn test_same_date_keeps_concatenation_order() {
        let manual = [
            doc("m1", json!({"title": "Breakfast", "amount": 10, "date": "2024-05-01"})),
            doc("m2", json!({"title": "Dinner", "amount": 30, "date": "2024-05-01"})),
        ];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Cinema", "totalAmount": 20,
                   "createdAt": "2024-05-01T21:00:00Z"}),
        )];

        let feed = run(&manual, &scanned);
        let ids: Vec<&str> = feed.iter().map(|tx| tx.id.as_str()).collect();
        assert_eq!(ids, ["manual:m1", "manual:m2", "ocr:s1"]);
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let manual = [
            doc("m1", json!({"title": "Swiggy order", "amount": 250, "date": "2024-05-01"})),
            doc("m2", json!({"title": "Metro card", "amount": 50, "date": "2024-05-03"})),
        ];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Receipt from Swiggy", "totalAmount": 250,
                   "createdAt": "2024-05-01T19:00:00Z"}),
        )];

        let first = run(&manual, &scanned);
        let second = run(&manual, &scanned);
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_titles_with_matching_amount_and_date_cluster() {
        // Cleanup turns both blanks into fallback labels; the pair still
        // counts as one purchase.
        let manual = [doc("m1", json!({"title": "", "amount": 99, "date": "2024-05-01"}))];
        let scanned = [doc(
            "s1",
            json!({"merchantName": " ", "totalAmount": 99,
                   "createdAt": "2024-05-01T12:00:00Z"}),
        )];

        let feed = run(&manual, &scanned);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].title, "Transaction");
    }

    #[test]
    fn test_precedence_flip_prefers_scanner() {
        let config =
            EngineConfig::from_toml_str("precedence = [\"ocr\", \"manual\"]\n").unwrap();
        let manual = [doc(
            "m1",
            json!({"title": "Swiggy order", "amount": 250, "date": "2024-05-01"}),
        )];
        let scanned = [doc(
            "s1",
            json!({"merchantName": "Receipt from Swiggy", "totalAmount": 250,
                   "createdAt": "2024-05-01T19:00:00Z"}),
        )];

        let feed = reconcile_snapshots(
            &[
                SnapshotInput {
                    source: SourceKind::Ocr,
                    records: &scanned,
                    received_at: received(),
                },
                SnapshotInput {
                    source: SourceKind::Manual,
                    records: &manual,
                    received_at: received(),
                },
            ],
            &config,
        );
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "ocr:s1");
        assert_eq!(feed[0].title, "Swiggy");
    }
}
