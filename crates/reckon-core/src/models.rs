//! Domain models for Reckon

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Expense categories known to the capture apps.
///
/// The list mirrors what the capture UIs offer; anything else (or nothing)
/// normalizes to [`DEFAULT_CATEGORY`].
pub const CATEGORIES: &[&str] = &[
    "Food & Dining",
    "Transportation",
    "Shopping",
    "Entertainment",
    "Technology",
    "Bills & Utilities",
    "Healthcare",
    "Education",
    "Travel",
    "Other",
];

/// Sentinel category assigned when a raw record carries none.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Sentinel payment method assigned when a raw record carries none.
pub const UNKNOWN_PAYMENT_METHOD: &str = "Unknown";

/// Capture path a transaction came from.
///
/// `Recurring` and `Import` are reserved for future capture paths; nothing
/// produces them today, but the id namespace and feed contract already
/// account for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Typed in by the user
    Manual,
    /// Extracted from a scanned receipt
    Ocr,
    /// Generated from a recurring schedule (reserved)
    Recurring,
    /// Bulk-imported from an external file (reserved)
    Import,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ocr => "ocr",
            Self::Recurring => "recurring",
            Self::Import => "import",
        }
    }

    /// Identifier namespace for this source.
    ///
    /// Raw ids from different collections may collide; prefixing makes the
    /// canonical id unique across sources.
    pub fn namespaced_id(&self, raw_id: &str) -> String {
        format!("{}:{}", self.as_str(), raw_id)
    }

    /// Display title substituted when cleanup leaves nothing usable.
    pub fn fallback_title(&self) -> &'static str {
        match self {
            Self::Ocr => "Receipt Transaction",
            _ => "Transaction",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ocr" | "scanner" | "scanned" => Ok(Self::Ocr),
            "recurring" => Ok(Self::Recurring),
            "import" => Ok(Self::Import),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether money left or entered the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[default]
    Expense,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            _ => Err(format!("Unknown transaction kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source document exactly as stored, before normalization.
///
/// The two collections have different shapes (manual records carry
/// `title`/`amount`/`category`/`date`, scanner records carry
/// `merchantName`/`totalAmount`/`category`/`createdAt`, and both camelCase
/// and snake_case spellings occur in the wild), so the fields are kept as an
/// untyped JSON map and interpreted during normalization. A `RawRecord` is
/// not retained past that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Stable document id within its collection
    pub id: String,
    /// Document fields as stored
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a field under any of its known spellings, first hit wins.
    pub fn field(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.fields.get(*name))
    }

    /// Look up a string field, ignoring empty values.
    pub fn str_field(&self, names: &[&str]) -> Option<&str> {
        self.field(names)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Parse a JSON array of documents, lifting `id` out of each field map.
    ///
    /// Documents without an id get their array index, which is stable for a
    /// snapshot that replaces wholesale.
    pub fn parse_array(text: &str) -> Result<Vec<RawRecord>> {
        let docs: Vec<Map<String, Value>> = serde_json::from_str(text)?;
        Ok(docs
            .into_iter()
            .enumerate()
            .map(|(index, mut fields)| {
                let id = match fields.remove("id") {
                    Some(Value::String(s)) if !s.trim().is_empty() => s,
                    Some(Value::Number(n)) => n.to_string(),
                    _ => index.to_string(),
                };
                RawRecord::new(id, fields)
            })
            .collect())
    }
}

/// A canonical transaction, the only shape that crosses the engine boundary.
///
/// Built fresh on every recomputation; consumers key off `id`, never object
/// identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Source-namespaced identifier (e.g. `manual:abc123`, `ocr:r42`)
    pub id: String,
    /// Cleaned display title
    pub title: String,
    /// Non-negative, meaningful to two decimal places
    pub amount: f64,
    pub category: String,
    pub kind: TransactionKind,
    pub source: SourceKind,
    /// Payment method as captured, `"Unknown"` when absent
    pub payment_method: String,
    /// Calendar date used for grouping and duplicate checks.
    /// OCR records use scan time, not any date printed on the receipt.
    pub date: NaiveDate,
    /// Source timestamps; sort stability only, never equality
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
