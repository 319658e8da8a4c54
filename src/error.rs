//! Error types for the statement ingest pipeline.
//!
//! Commands use `anyhow` at the boundary (as `crate::Result`), while the
//! pipeline stages fail with [`PipelineError`] so callers can tell an
//! unregistered issuer apart from a rejected file or a storage fault. The
//! asymmetry between dates and amounts is deliberate: an unparseable date
//! degrades to a counted null, an unparseable amount rejects the whole file.

use crate::store::StoreError;
use thiserror::Error;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds of the normalize/identify/merge pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The issuer has no registered schema. Raised before any I/O side
    /// effects; callers must not fall back to a guessed column layout.
    #[error("issuer '{issuer}' is unsupported/unrecognized")]
    UnknownIssuer { issuer: String },

    /// The statement header lacks a column the issuer schema names. A
    /// configuration/input mismatch, so the whole file is rejected.
    #[error("statement is missing expected column '{column}'")]
    MissingColumn { column: String },

    /// A row's amount could not be parsed as a number. Financial amounts are
    /// never coerced or dropped, so the whole file is rejected.
    #[error("row {row}: amount '{value}' is not numeric")]
    MalformedAmount { row: usize, value: String },

    /// The statement could not be read as CSV at all.
    #[error("unable to read the statement as CSV")]
    InvalidStatement {
        #[source]
        source: csv::Error,
    },

    /// The pre-merge snapshot of the existing ledger failed. The master is
    /// never overwritten without a successful backup.
    #[error("unable to back up the existing ledger")]
    BackupFailed {
        #[source]
        source: StoreError,
    },

    /// The master ledger changed between read and write. The merge aborts
    /// with no write; callers are expected to serialize merges per user.
    #[error("the ledger was modified by another upload while merging")]
    ConcurrentModification,

    /// A stored ledger object could not be decoded.
    #[error("the stored ledger could not be decoded: {message}")]
    CorruptLedger { message: String },

    /// Underlying storage failure other than a missing master ledger.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// A short stable name for the failure kind, used in user-facing error
    /// reports in place of a stack trace.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnknownIssuer { .. } => "unknown_issuer",
            PipelineError::MissingColumn { .. } => "missing_column",
            PipelineError::MalformedAmount { .. } => "malformed_amount",
            PipelineError::InvalidStatement { .. } => "invalid_statement",
            PipelineError::BackupFailed { .. } => "backup_failed",
            PipelineError::ConcurrentModification => "concurrent_modification",
            PipelineError::CorruptLedger { .. } => "corrupt_ledger",
            PipelineError::Store(StoreError::NotFound { .. }) => "not_found",
            PipelineError::Store(StoreError::Io { .. }) => "storage",
        }
    }
}
