use crate::args::IngestArgs;
use crate::commands::Out;
use crate::issuers::{Registry, ISSUERS_KEY};
use crate::model::NormalizedTransaction;
use crate::report::IngestSummary;
use crate::store::{BlobStore, FsStore};
use crate::{identity, ledger, merge, normalize, Config, Result};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

/// Runs the full ingest pipeline for one statement file: archive the raw
/// upload, normalize it through the issuer schema, assign transaction
/// identities, snapshot the cleaned rows, and merge them into the user's
/// ledger.
///
/// Concurrent ingests for the same user must be serialized by the caller;
/// the merge fails closed (no write) if it detects interference.
pub async fn ingest(config: &Config, args: &IngestArgs) -> Result<Out<IngestSummary>> {
    let issuer = args.issuer().to_lowercase();
    let user = args.user();

    let store = FsStore::open(config.store_root()).await?;
    let registry = Registry::from_store(&store, ISSUERS_KEY).await?;
    let schema = registry.get(&issuer)?.clone();

    let raw = tokio::fs::read(args.file())
        .await
        .with_context(|| format!("Unable to read statement file {}", args.file().display()))?;

    // Archive the raw upload before any processing.
    let uploaded_at = Utc::now().naive_utc().format("%Y-%m-%dT%H-%M-%S-%6f");
    let raw_key = ledger::statement_key(
        user,
        &issuer,
        &format!("{issuer}_statement_{uploaded_at}.csv"),
    );
    store.put(&raw_key, &raw).await?;
    debug!("Archived raw statement at {raw_key}");

    let normalized = normalize::normalize(raw.as_slice(), &schema, &issuer)?;
    info!("Read {} rows from raw CSV", normalized.rows.len());

    let mut rows = normalized.rows;
    identity::assign_ids(&mut rows);

    // Snapshot the cleaned rows for review tooling, named by date range.
    let date_range = date_range(&rows);
    let cleaned_key = match date_range {
        Some((from, to)) if !rows.is_empty() => {
            let key = ledger::cleaned_key(user, &issuer, from, to);
            store.put(&key, &cleaned_csv(&rows)?).await?;
            info!("Uploaded cleaned file to: {key}");
            Some(key)
        }
        _ => {
            if !rows.is_empty() {
                warn!("No parseable dates in this statement, skipping the cleaned snapshot");
            }
            None
        }
    };

    let (_ledger, stats) = merge::merge(&store, user, rows).await?;

    let summary = IngestSummary::from_merge(
        user,
        &issuer,
        stats.rows_new,
        normalized.invalid_dates,
        date_range,
        cleaned_key,
        &stats,
    );
    Ok(Out::new(summary.message(), summary))
}

/// The (min, max) dates across rows that have one.
fn date_range(rows: &[NormalizedTransaction]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = rows.iter().filter_map(|r| r.transaction_date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Serializes the cleaned rows as a CSV snapshot.
fn cleaned_csv(rows: &[NormalizedTransaction]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .context("Unable to serialize a cleaned row")?;
    }
    writer.flush().context("Unable to flush the cleaned snapshot")?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Unable to finish the cleaned snapshot: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::identity;
    use crate::ledger::Ledger;
    use crate::test::TestEnv;
    use sha2::{Digest, Sha256};

    const COFFEE_STATEMENT: &str = "\
Date,Description,Amount
2024-01-05,Coffee Shop,5.00
2024-01-05,Coffee Shop,5.00
";

    #[tokio::test]
    async fn test_end_to_end_same_day_repeats() {
        let env = TestEnv::new().await;
        let file = env.write_file("statement.csv", COFFEE_STATEMENT).await;
        let args = IngestArgs::new(file, "amex", "alice");

        let out = ingest(env.config(), &args).await.unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.rows_parsed, 2);
        assert_eq!(summary.rows_added, 2);
        assert_eq!(summary.duplicates_dropped, 0);
        assert_eq!(summary.ledger_rows, 2);
        assert_eq!(summary.invalid_dates, 0);

        let store = env.store().await;
        let master = store.get(&ledger::master_key("alice")).await.unwrap();
        let ledger = Ledger::from_parquet(master).unwrap();
        assert_eq!(ledger.len(), 2);

        // Amex reports expenses as positive, so both rows come out negative.
        assert_eq!(ledger.rows()[0].amount, -5.00);
        assert_eq!(ledger.rows()[1].amount, -5.00);

        // First id is the fingerprint; the repeat is a digest of
        // "2 occurrence of {fingerprint}".
        let base = identity::fingerprint(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 5),
            "Coffee Shop",
        );
        let second = hex::encode(Sha256::digest(format!("2 occurrence of {base}")));
        assert_eq!(ledger.rows()[0].transaction_id, base);
        assert_eq!(ledger.rows()[1].transaction_id, second);

        for row in ledger.rows() {
            assert_eq!(row.category, None);
            assert_eq!(row.notes, None);
            assert_eq!(row.statement_issuer, "amex");
        }
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let env = TestEnv::new().await;
        let file = env.write_file("statement.csv", COFFEE_STATEMENT).await;
        let args = IngestArgs::new(file, "amex", "alice");

        ingest(env.config(), &args).await.unwrap();
        let out = ingest(env.config(), &args).await.unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.rows_added, 0);
        assert_eq!(summary.duplicates_dropped, 2);
        assert_eq!(summary.ledger_rows, 2);

        // The second run backed up the first run's master.
        let store = env.store().await;
        let backups = store.list("alice/backups/").await.unwrap();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn test_issuer_id_is_lowercased() {
        let env = TestEnv::new().await;
        let file = env.write_file("statement.csv", COFFEE_STATEMENT).await;
        let args = IngestArgs::new(file, "AMEX", "alice");

        let out = ingest(env.config(), &args).await.unwrap();
        assert_eq!(out.structure().unwrap().issuer, "amex");
    }

    #[tokio::test]
    async fn test_unknown_issuer_fails_before_writing() {
        let env = TestEnv::new().await;
        let file = env.write_file("statement.csv", COFFEE_STATEMENT).await;
        let args = IngestArgs::new(file, "acme", "alice");

        let err = ingest(env.config(), &args).await.unwrap_err();
        let kind = err.downcast_ref::<PipelineError>().map(PipelineError::kind);
        assert_eq!(kind, Some("unknown_issuer"));

        // Nothing landed in the store for this user.
        let store = env.store().await;
        assert!(store.list("alice/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_amount_leaves_ledger_untouched() {
        let env = TestEnv::new().await;
        let good = env.write_file("good.csv", COFFEE_STATEMENT).await;
        ingest(env.config(), &IngestArgs::new(good, "amex", "alice"))
            .await
            .unwrap();
        let store = env.store().await;
        let master_before = store.get(&ledger::master_key("alice")).await.unwrap();

        let bad = env
            .write_file(
                "bad.csv",
                "Date,Description,Amount\n2024-01-06,Lunch,abc\n",
            )
            .await;
        let err = ingest(env.config(), &IngestArgs::new(bad, "amex", "alice"))
            .await
            .unwrap_err();
        let kind = err.downcast_ref::<PipelineError>().map(PipelineError::kind);
        assert_eq!(kind, Some("malformed_amount"));

        let master_after = store.get(&ledger::master_key("alice")).await.unwrap();
        assert_eq!(master_before, master_after);
        assert!(store.list("alice/backups/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_dates_are_tolerated_and_counted() {
        let env = TestEnv::new().await;
        let file = env
            .write_file(
                "statement.csv",
                "Date,Description,Amount\n\
                 not-a-date,Mystery,9.99\n\
                 2024-01-06,Lunch,12.00\n",
            )
            .await;

        let out = ingest(env.config(), &IngestArgs::new(file, "amex", "alice"))
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        assert_eq!(summary.rows_parsed, 2);
        assert_eq!(summary.invalid_dates, 1);
        assert_eq!(summary.rows_added, 2);
    }

    #[tokio::test]
    async fn test_cleaned_snapshot_is_written_with_date_range_name() {
        let env = TestEnv::new().await;
        let file = env
            .write_file(
                "statement.csv",
                "Date,Description,Amount\n\
                 2024-01-31,Lunch,12.00\n\
                 2024-01-05,Coffee Shop,5.00\n",
            )
            .await;

        let out = ingest(env.config(), &IngestArgs::new(file, "amex", "alice"))
            .await
            .unwrap();
        let summary = out.structure().unwrap();
        let key = summary.cleaned_key.clone().unwrap();
        assert_eq!(
            key,
            "alice/cleaned/amex activity from 2024-01-05 to 2024-01-31.csv"
        );

        let store = env.store().await;
        let snapshot = String::from_utf8(store.get(&key).await.unwrap()).unwrap();
        assert!(snapshot.contains("Coffee Shop"));
        assert!(snapshot.contains("-12.00") || snapshot.contains("-12.0"));
    }

    #[tokio::test]
    async fn test_raw_statement_is_archived() {
        let env = TestEnv::new().await;
        let file = env.write_file("statement.csv", COFFEE_STATEMENT).await;
        ingest(env.config(), &IngestArgs::new(file, "amex", "alice"))
            .await
            .unwrap();

        let store = env.store().await;
        let archived = store.list("alice/statements/amex/").await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(
            store.get(&archived[0]).await.unwrap(),
            COFFEE_STATEMENT.as_bytes()
        );
    }
}
