//! Normalization of raw source documents into canonical transactions
//!
//! Each capture path stores a different document shape; this module maps
//! either shape onto [`Transaction`] with per-field recovery: malformed or
//! missing optional fields default rather than failing the batch, and every
//! coercion is logged so downstream consumers can audit what was guessed.
//!
//! Normalization is deterministic: the caller supplies the fallback instant
//! used for missing timestamps, so re-normalizing an unchanged snapshot
//! yields bit-identical transactions.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{
    RawRecord, SourceKind, Transaction, TransactionKind, DEFAULT_CATEGORY, UNKNOWN_PAYMENT_METHOD,
};

/// Boilerplate the scanner (and sloppy manual entries) wrap around titles.
/// Matched case-insensitively, removed everywhere they occur.
const TITLE_BOILERPLATE: &[&str] = &[
    "receipt from ",
    "extracted text:",
    "receipt:",
    "transaction:",
];

/// Map one raw document onto the canonical transaction shape.
///
/// `fallback` is used for any timestamp the document lacks; the reconciler
/// passes the snapshot's arrival time so repeated normalization of the same
/// stored snapshot is stable.
pub fn normalize_record(
    record: &RawRecord,
    source: SourceKind,
    fallback: DateTime<Utc>,
) -> Transaction {
    let raw_title = match source {
        SourceKind::Ocr => record.str_field(&["merchantName", "merchant_name", "title", "description"]),
        _ => record.str_field(&["title", "description"]),
    }
    .unwrap_or("");
    let title = clean_title(raw_title, source);

    let amount = coerce_amount(record, source);
    let kind = resolve_kind(record, source);

    let category = record
        .str_field(&["category"])
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();
    let payment_method = record
        .str_field(&["payment_method", "paymentMethod"])
        .unwrap_or(UNKNOWN_PAYMENT_METHOD)
        .to_string();

    let created_at = record
        .field(&["createdAt", "created_at"])
        .and_then(parse_timestamp)
        .unwrap_or(fallback);
    let updated_at = record
        .field(&["updatedAt", "updated_at"])
        .and_then(parse_timestamp)
        .unwrap_or(created_at);

    // OCR display dates follow scan time; a date printed on the receipt is
    // not trusted. Manual entries carry their own date field.
    let date = match source {
        SourceKind::Ocr => created_at.date_naive(),
        _ => resolve_manual_date(record, fallback),
    };

    Transaction {
        id: source.namespaced_id(&record.id),
        title,
        amount,
        category,
        kind,
        source,
        payment_method,
        date,
        created_at,
        updated_at,
    }
}

/// Strip boilerplate, collapse whitespace, and enforce a minimum length.
///
/// Anything shorter than 2 characters after cleanup becomes the per-source
/// fallback label so the feed never shows blank rows.
pub fn clean_title(raw: &str, source: SourceKind) -> String {
    let collapsed = collapse_whitespace(&strip_boilerplate(raw));
    if collapsed.chars().count() < 2 {
        source.fallback_title().to_string()
    } else {
        collapsed
    }
}

/// Cleanup + lowercase, the form titles are compared in.
///
/// No fallback label here: the duplicate detector defines its own handling
/// for empty keys.
pub fn match_key(title: &str) -> String {
    collapse_whitespace(&strip_boilerplate(title)).to_lowercase()
}

fn strip_boilerplate(raw: &str) -> String {
    let mut text = raw.to_string();
    for pattern in TITLE_BOILERPLATE {
        while let Some(pos) = find_ascii_ci(&text, pattern) {
            text.replace_range(pos..pos + pattern.len(), "");
        }
    }
    text
}

/// Byte position of an ASCII needle, ignoring ASCII case.
///
/// The needle is pure ASCII, so a matching position is always a char
/// boundary in the haystack.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull the amount out of whichever field this source uses.
///
/// Malformed or missing amounts coerce to 0.0 with a warning; the record
/// itself is never dropped, so raw counts stay honest. The stored amount is
/// the absolute value rounded to cents (the sign is a storage convention,
/// covered by `resolve_kind`).
fn coerce_amount(record: &RawRecord, source: SourceKind) -> f64 {
    let names: &[&str] = match source {
        SourceKind::Ocr => &["totalAmount", "total_amount", "amount"],
        _ => &["amount"],
    };

    let raw = match record.field(names) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_amount(s).ok(),
        Some(_) | None => None,
    };

    match raw {
        Some(value) if value.is_finite() => round_cents(value.abs()),
        _ => {
            warn!(
                source = %source,
                record_id = %record.id,
                "Missing or malformed amount, coercing to 0"
            );
            0.0
        }
    }
}

fn resolve_kind(record: &RawRecord, source: SourceKind) -> TransactionKind {
    // Scanned receipts are always purchases. Manual entries say so
    // explicitly or default to expense; the sign of the stored amount is a
    // display convention in the capture app, not a type.
    if source == SourceKind::Ocr {
        return TransactionKind::Expense;
    }
    record
        .str_field(&["type", "kind"])
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn resolve_manual_date(record: &RawRecord, fallback: DateTime<Utc>) -> NaiveDate {
    match record.str_field(&["date"]) {
        Some(raw) => match parse_date(raw) {
            Ok(date) => date,
            Err(_) => {
                warn!(record_id = %record.id, "Unparseable date {:?}, using fallback", raw);
                fallback.date_naive()
            }
        },
        None => fallback.date_naive(),
    }
}

/// Parse a date string in the formats the capture apps emit
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-05-01
        "%m/%d/%Y", // 05/01/2024
        "%m/%d/%y", // 05/01/24
        "%m-%d-%Y", // 05-01-2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::InvalidData(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols and commas
pub fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '₹', '€', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::InvalidData(format!("Unable to parse amount: {}", s)))
}

/// Timestamps arrive as RFC 3339 strings, plain dates, or epoch numbers
/// (seconds or milliseconds).
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            // Plain dates become midnight UTC
            parse_date(s)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            // Epoch values past ~2001 in milliseconds
            let millis = if raw.abs() >= 1e12 { raw } else { raw * 1000.0 };
            DateTime::from_timestamp_millis(millis as i64)
        }
        _ => None,
    }
}

/// Creation time of a raw document, used for snapshot ordering
pub(crate) fn record_created_at(record: &RawRecord) -> Option<DateTime<Utc>> {
    record
        .field(&["createdAt", "created_at", "date"])
        .and_then(parse_timestamp)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
