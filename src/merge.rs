//! The ledger merge engine.
//!
//! Loads the user's existing ledger (absent means "start fresh"), snapshots
//! it to a backup object, unions it with the newly identified rows, dedups
//! by `transaction_id` keeping the first occurrence, and persists the
//! result. Existing rows go first in the union so a duplicate id keeps the
//! copy carrying any human-assigned category and notes.
//!
//! Concurrent merges for the same user must be serialized by the caller
//! (per-user queue, lease, or conditional write). The engine fails closed
//! when that precondition is violated: it remembers a digest of the master
//! bytes it loaded and re-reads the master immediately before the final
//! write, aborting without writing if anything changed in between.

use crate::error::PipelineError;
use crate::ledger::{self, Ledger, LedgerRow};
use crate::model::NormalizedTransaction;
use crate::store::{BlobStore, StoreError};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, warn};

/// Counters describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Rows read from the new upload.
    pub rows_new: usize,
    /// Rows in the ledger before the merge.
    pub rows_existing: usize,
    /// Duplicate rows dropped by the `transaction_id` dedup.
    pub duplicates_dropped: usize,
    /// Rows in the ledger after the merge.
    pub rows_final: usize,
}

/// The version token of the master object as loaded: a digest of its bytes,
/// or `Absent` when there was no ledger yet.
enum MasterVersion {
    Absent,
    Present([u8; 32]),
}

impl MasterVersion {
    fn of(bytes: &[u8]) -> Self {
        MasterVersion::Present(Sha256::digest(bytes).into())
    }
}

/// Merges `new_rows` into the user's ledger.
///
/// An empty `new_rows` is a no-op: the existing ledger is returned
/// unchanged, no backup is taken, and nothing is written. Otherwise the
/// sequence is read, backup, union + dedup, verify-unchanged, write; any
/// failure before the final write leaves the master untouched.
pub async fn merge(
    store: &dyn BlobStore,
    user: &str,
    new_rows: Vec<NormalizedTransaction>,
) -> Result<(Ledger, MergeStats)> {
    let master_key = ledger::master_key(user);

    // Load the existing ledger; a missing object means "start fresh".
    let (existing, version) = match store.get(&master_key).await {
        Ok(bytes) => {
            let version = MasterVersion::of(&bytes);
            let ledger = Ledger::from_parquet(bytes)
                .map_err(|e| PipelineError::CorruptLedger {
                    message: format!("{e:#}"),
                })?;
            info!("Read {} rows from master file", ledger.len());
            (ledger, version)
        }
        Err(e) if e.is_not_found() => {
            warn!("Master file not found. Starting fresh.");
            (Ledger::empty(), MasterVersion::Absent)
        }
        Err(e) => return Err(PipelineError::Store(e).into()),
    };

    let rows_existing = existing.len();
    let rows_new = new_rows.len();

    if new_rows.is_empty() {
        warn!("New upload is empty. Skipping update.");
        let stats = MergeStats {
            rows_new: 0,
            rows_existing,
            duplicates_dropped: 0,
            rows_final: rows_existing,
        };
        return Ok((existing, stats));
    }

    // Snapshot the current master before any destructive write.
    if matches!(version, MasterVersion::Present(_)) {
        let backup_key = ledger::backup_key(
            user,
            existing.uncategorized_count(),
            rows_existing,
            Utc::now().naive_utc(),
        );
        store
            .copy(&master_key, &backup_key)
            .await
            .map_err(|e| PipelineError::BackupFailed { source: e })?;
        info!("Backed up latest master file at {backup_key}");
    }

    // Union with existing rows first so their category/notes win on
    // duplicate ids, then dedup keeping the first occurrence.
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Ledger::empty();
    let before = rows_existing + rows_new;
    for row in existing
        .rows()
        .iter()
        .cloned()
        .chain(new_rows.into_iter().map(LedgerRow::from_new))
    {
        if row.transaction_id.is_empty() {
            warn!("Dropping a row with no transaction id");
            continue;
        }
        if seen.insert(row.transaction_id.clone()) {
            merged.push(row);
        }
    }
    let rows_final = merged.len();
    let duplicates_dropped = before - rows_final;
    info!("Dropped {duplicates_dropped} duplicate rows. Final row count: {rows_final}");

    let encoded = merged.to_parquet()?;

    // Fail closed if another upload touched the master while we merged.
    verify_unchanged(store, &master_key, &version).await?;

    store
        .put(&master_key, &encoded)
        .await
        .map_err(PipelineError::Store)?;
    info!("Updated master file at {master_key}");

    let stats = MergeStats {
        rows_new,
        rows_existing,
        duplicates_dropped,
        rows_final,
    };
    Ok((merged, stats))
}

async fn verify_unchanged(
    store: &dyn BlobStore,
    master_key: &str,
    version: &MasterVersion,
) -> Result<()> {
    let current: Option<[u8; 32]> = match store.get(master_key).await {
        Ok(bytes) => Some(Sha256::digest(&bytes).into()),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(PipelineError::Store(e).into()),
    };
    let unchanged = match (version, current) {
        (MasterVersion::Absent, None) => true,
        (MasterVersion::Present(loaded), Some(now)) => *loaded == now,
        _ => false,
    };
    if unchanged {
        Ok(())
    } else {
        Err(PipelineError::ConcurrentModification.into())
    }
}
