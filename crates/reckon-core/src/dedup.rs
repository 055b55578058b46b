//! Fuzzy duplicate detection across capture paths
//!
//! A purchase captured twice (typed in and scanned) rarely matches exactly:
//! OCR mangles the merchant name and the amounts drift by rounding. A
//! candidate counts as a duplicate of an accepted transaction only when all
//! three checks hold:
//! 1. amounts within a currency-unit epsilon
//! 2. same calendar date (day-month-year, never time-of-day)
//! 3. cleaned titles where one contains the other, or normalized Levenshtein
//!    similarity above the threshold
//!
//! Failing any single check keeps both transactions: two distinct purchases
//! that share amount and date must both survive.

use tracing::debug;

use crate::models::Transaction;
use crate::normalize;

/// Thresholds for the three-check duplicate match
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Maximum amount difference still considered equal
    pub amount_epsilon: f64,
    /// Title similarity a pair must exceed (strictly) to match
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            amount_epsilon: 0.01,      // one cent
            similarity_threshold: 0.7,
        }
    }
}

/// Decides whether a candidate duplicates anything already accepted.
///
/// Detection is a linear scan over the accepted list, quadratic across a full
/// recomputation. Fine at interactive feed sizes (hundreds of transactions);
/// a scaling pass would need an (amount, date) index first.
#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// True when `candidate` near-duplicates any accepted transaction.
    /// First match wins; later entries are not consulted.
    pub fn is_duplicate(&self, candidate: &Transaction, accepted: &[Transaction]) -> bool {
        accepted.iter().any(|kept| self.matches(candidate, kept))
    }

    /// Filter a candidate list in processing order, keeping the first member
    /// of every duplicate cluster.
    ///
    /// The order of `candidates` is the retention policy: the reconciler
    /// concatenates snapshots in configured precedence order before calling
    /// this, so "first seen" means "earlier source", not "created earlier in
    /// real time".
    pub fn filter_duplicates(&self, candidates: Vec<Transaction>) -> Vec<Transaction> {
        let mut accepted: Vec<Transaction> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.is_duplicate(&candidate, &accepted) {
                debug!(id = %candidate.id, title = %candidate.title, "Dropping near-duplicate");
            } else {
                accepted.push(candidate);
            }
        }
        accepted
    }

    fn matches(&self, a: &Transaction, b: &Transaction) -> bool {
        if (a.amount - b.amount).abs() >= self.config.amount_epsilon {
            return false;
        }
        if a.date != b.date {
            return false;
        }
        self.title_similarity(&a.title, &b.title) > self.config.similarity_threshold
    }

    /// Similarity of two titles after cleanup and lowercasing.
    ///
    /// Containment short-circuits to 1.0 ("Swiggy" vs "Swiggy Order"); an
    /// empty pair is defined as 1.0 so blank-title records with matching
    /// amount and date still cluster. Otherwise this is
    /// `(max_len - edit_distance) / max_len`.
    pub fn title_similarity(&self, a: &str, b: &str) -> f64 {
        let a = normalize::match_key(a);
        let b = normalize::match_key(b);

        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
            return 1.0;
        }
        strsim::normalized_levenshtein(&a, &b)
    }
}
