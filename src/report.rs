//! Run summaries for the calling orchestrator.
//!
//! Successful runs produce an [`IngestSummary`]; failures produce a
//! [`FailureReport`] with a stable kind and a message, never a stack trace.
//! Full error chains go to the operator log only.

use crate::error::PipelineError;
use crate::ledger::Ledger;
use crate::merge::MergeStats;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outcome of one statement ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub user: String,
    pub issuer: String,
    /// Rows parsed from the uploaded statement.
    pub rows_parsed: usize,
    /// Rows whose date failed to parse and were kept with a null date.
    pub invalid_dates: usize,
    /// Rows actually added to the ledger (new rows minus duplicates).
    pub rows_added: usize,
    pub duplicates_dropped: usize,
    /// Ledger size after the merge.
    pub ledger_rows: usize,
    /// Date range spanned by the parsed statement rows, when any had dates.
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Store key of the cleaned statement snapshot, when one was written.
    pub cleaned_key: Option<String>,
}

impl IngestSummary {
    pub fn from_merge(
        user: impl Into<String>,
        issuer: impl Into<String>,
        rows_parsed: usize,
        invalid_dates: usize,
        date_range: Option<(NaiveDate, NaiveDate)>,
        cleaned_key: Option<String>,
        stats: &MergeStats,
    ) -> Self {
        let (first_date, last_date) = match date_range {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };
        Self {
            user: user.into(),
            issuer: issuer.into(),
            rows_parsed,
            invalid_dates,
            rows_added: stats.rows_final - stats.rows_existing,
            duplicates_dropped: stats.duplicates_dropped,
            ledger_rows: stats.rows_final,
            first_date,
            last_date,
            cleaned_key,
        }
    }

    /// A one-line human message describing the outcome.
    pub fn message(&self) -> String {
        let mut message = format!(
            "Processed {} rows from {}: {} added, {} duplicates dropped, ledger now has {} rows",
            self.rows_parsed, self.issuer, self.rows_added, self.duplicates_dropped, self.ledger_rows
        );
        if let (Some(from), Some(to)) = (self.first_date, self.last_date) {
            message.push_str(&format!(" (activity from {from} to {to})"));
        }
        if self.invalid_dates > 0 {
            message.push_str(&format!(
                "; {} rows had invalid dates and need review",
                self.invalid_dates
            ));
        }
        message
    }
}

/// Read-only summary of a user's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub user: String,
    pub total_rows: usize,
    pub uncategorized_rows: usize,
    /// Latest transaction date per issuer.
    pub latest_by_issuer: BTreeMap<String, NaiveDate>,
    /// To avoid gaps, the next upload should start on or before this date
    /// (the oldest of the per-issuer latest dates).
    pub recommended_from: Option<NaiveDate>,
}

impl StatusSummary {
    pub fn from_ledger(user: impl Into<String>, ledger: &Ledger) -> Self {
        let latest_by_issuer = ledger.latest_dates_by_issuer();
        let recommended_from = latest_by_issuer.values().min().copied();
        Self {
            user: user.into(),
            total_rows: ledger.len(),
            uncategorized_rows: ledger.uncategorized_count(),
            latest_by_issuer,
            recommended_from,
        }
    }

    pub fn message(&self) -> String {
        if self.total_rows == 0 {
            return format!("No ledger exists yet for {}", self.user);
        }
        let mut message = format!(
            "Ledger for {} has {} rows ({} uncategorized)",
            self.user, self.total_rows, self.uncategorized_rows
        );
        if let Some(from) = self.recommended_from {
            message.push_str(&format!(
                "; to prevent gaps, upload statements from {from} or earlier"
            ));
        }
        message
    }
}

/// The user-facing shape of a failed run.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Stable failure kind, e.g. `unknown_issuer` or `malformed_amount`.
    pub kind: String,
    pub message: String,
}

impl FailureReport {
    /// Classifies an error from the command layer. Pipeline errors carry
    /// their own kind; anything else is an internal error whose details
    /// belong in the operator log.
    pub fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<PipelineError>() {
            Some(pipeline_error) => Self {
                kind: pipeline_error.kind().to_string(),
                message: pipeline_error.to_string(),
            },
            None => Self {
                kind: "internal".to_string(),
                message: error.to_string(),
            },
        }
    }
}
