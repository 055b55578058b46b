//! Reckon Core Library
//!
//! Shared functionality for the Reckon multi-source transaction
//! reconciliation engine:
//! - Canonical transaction model and source-namespaced identifiers
//! - Normalization of heterogeneous raw documents (manual entry, OCR scans)
//! - Fuzzy duplicate detection (amount tolerance + calendar date + title
//!   similarity)
//! - Live two-source reconciliation: snapshot fan-in, full recomputation,
//!   merged feed fan-out
//! - Feed summaries for downstream consumers

pub mod config;
pub mod dedup;
pub mod error;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod source;
pub mod summary;

pub use config::EngineConfig;
pub use dedup::{DedupConfig, DuplicateDetector};
pub use error::{Error, Result};
pub use models::{RawRecord, SourceKind, Transaction, TransactionKind};
pub use reconcile::{
    reconcile_snapshots, Reconciler, ReconcilerState, SnapshotInput, TransactionFeed,
};
pub use source::{MemorySource, SourceAdapter, SourceSnapshot, SubscriptionHandle};
pub use summary::FeedSummary;
