//! Transaction identity assignment.
//!
//! Every normalized row gets a deterministic `transaction_id` derived from
//! its `(date, description)` fingerprint. The amount is deliberately left
//! out of the fingerprint so that a user can later adjust an amount (for
//! example when splitting a shared cost) without the row counting as a new
//! transaction. Legitimate repeats (same date and description appearing
//! more than once in a statement) get distinct ids keyed by their
//! occurrence number so the downstream dedup cannot collapse them.

use crate::model::NormalizedTransaction;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// The base fingerprint over `(date, description)`.
///
/// The date renders as `%Y-%m-%d`, or the empty string when the date failed
/// to parse, so the encoding is stable across runs and platforms.
pub fn fingerprint(date: Option<NaiveDate>, description: &str) -> String {
    let date_part = date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(date_part.as_bytes());
    hasher.update(b"|");
    hasher.update(description.as_bytes());
    hex::encode(hasher.finalize())
}

fn repeat_id(occurrence: u32, base: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{occurrence} occurrence of {base}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Populates `transaction_id` on every row, in input order.
///
/// A single pass with a local occurrence counter per fingerprint: the first
/// occurrence uses the fingerprint itself, the Nth (N >= 2) uses a digest of
/// `"{N} occurrence of {fingerprint}"`. Identical input sequences always
/// produce identical id sequences.
pub fn assign_ids(rows: &mut [NormalizedTransaction]) {
    let mut occurrences: HashMap<String, u32> = HashMap::new();
    for row in rows.iter_mut() {
        let base = fingerprint(row.transaction_date, &row.description);
        let count = occurrences.entry(base.clone()).or_insert(0);
        *count += 1;
        let id = if *count == 1 {
            base
        } else {
            repeat_id(*count, &base)
        };
        row.transaction_id = Some(id);
    }
}
