//! The durable ledger table and its parquet representation.
//!
//! A ledger is the per-user union of every normalized transaction seen so
//! far, plus the two user-editable columns (`category`, `notes`). It
//! persists as a snappy-compressed parquet object; this module owns the
//! codec, the store key layout, and the read-only queries that the status
//! report needs.

use crate::model::NormalizedTransaction;
use crate::Result;
use anyhow::Context;
use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::sync::Arc;

const TRANSACTION_ID: &str = "transaction_id";
const TRANSACTION_DATE: &str = "transaction_date";
const DESCRIPTION: &str = "description";
const AMOUNT: &str = "amount";
const STATEMENT_ISSUER: &str = "statement_issuer";
const CATEGORY: &str = "category";
const NOTES: &str = "notes";

/// One row of the persistent ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub transaction_id: String,
    pub transaction_date: Option<NaiveDate>,
    pub description: String,
    pub amount: f64,
    pub statement_issuer: String,
    pub category: Option<String>,
    pub notes: Option<String>,
}

impl LedgerRow {
    /// Builds a fresh ledger row from a normalized transaction. The
    /// user-editable columns start out null; human review fills them in
    /// later, outside this pipeline.
    pub fn from_new(tx: NormalizedTransaction) -> Self {
        Self {
            transaction_id: tx.transaction_id.unwrap_or_default(),
            transaction_date: tx.transaction_date,
            description: tx.description,
            amount: tx.amount.to_f64(),
            statement_issuer: tx.statement_issuer,
            category: None,
            notes: None,
        }
    }
}

/// The per-user ledger table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: LedgerRow) {
        self.rows.push(row);
    }

    /// Rows whose `category` has not been assigned yet.
    pub fn uncategorized_count(&self) -> usize {
        self.rows.iter().filter(|r| r.category.is_none()).count()
    }

    /// Latest transaction date per issuer, for the status report's
    /// "upload statements from this date or earlier" hint.
    pub fn latest_dates_by_issuer(&self) -> BTreeMap<String, NaiveDate> {
        let mut latest: BTreeMap<String, NaiveDate> = BTreeMap::new();
        for row in &self.rows {
            let Some(date) = row.transaction_date else {
                continue;
            };
            latest
                .entry(row.statement_issuer.clone())
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }
        latest
    }

    /// The (min, max) transaction dates across rows with a parsed date.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.rows.iter().filter_map(|r| r.transaction_date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }

    /// Encodes the ledger as snappy-compressed parquet.
    pub fn to_parquet(&self) -> Result<Vec<u8>> {
        let schema = Arc::new(ledger_schema());

        let epoch = epoch();
        let ids: Vec<&str> = self.rows.iter().map(|r| r.transaction_id.as_str()).collect();
        let dates: Vec<Option<i32>> = self
            .rows
            .iter()
            .map(|r| {
                r.transaction_date
                    .map(|d| d.signed_duration_since(epoch).num_days() as i32)
            })
            .collect();
        let descriptions: Vec<&str> = self.rows.iter().map(|r| r.description.as_str()).collect();
        let amounts: Vec<f64> = self.rows.iter().map(|r| r.amount).collect();
        let issuers: Vec<&str> = self
            .rows
            .iter()
            .map(|r| r.statement_issuer.as_str())
            .collect();
        let categories: Vec<Option<&str>> =
            self.rows.iter().map(|r| r.category.as_deref()).collect();
        let notes: Vec<Option<&str>> = self.rows.iter().map(|r| r.notes.as_deref()).collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(Date32Array::from(dates)),
            Arc::new(StringArray::from(descriptions)),
            Arc::new(Float64Array::from(amounts)),
            Arc::new(StringArray::from(issuers)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(notes)),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("Unable to assemble the ledger record batch")?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
            .context("Unable to create the parquet writer")?;
        writer
            .write(&batch)
            .context("Unable to write the ledger record batch")?;
        writer.close().context("Unable to finish the parquet file")?;
        Ok(buffer)
    }

    /// Decodes a ledger from parquet bytes.
    ///
    /// Ledgers written before the user-editable columns existed are
    /// tolerated: a missing `category` or `notes` column reads as all-null.
    pub fn from_parquet(bytes: Vec<u8>) -> Result<Self> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
            .context("Unable to open the stored ledger as parquet")?
            .build()
            .context("Unable to read the stored ledger")?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.context("Unable to decode a ledger record batch")?;
            append_rows(&mut rows, &batch)?;
        }
        Ok(Self { rows })
    }
}

fn ledger_schema() -> Schema {
    Schema::new(vec![
        Field::new(TRANSACTION_ID, DataType::Utf8, false),
        Field::new(TRANSACTION_DATE, DataType::Date32, true),
        Field::new(DESCRIPTION, DataType::Utf8, false),
        Field::new(AMOUNT, DataType::Float64, false),
        Field::new(STATEMENT_ISSUER, DataType::Utf8, false),
        Field::new(CATEGORY, DataType::Utf8, true),
        Field::new(NOTES, DataType::Utf8, true),
    ])
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("the unix epoch is a valid date")
}

fn append_rows(rows: &mut Vec<LedgerRow>, batch: &RecordBatch) -> Result<()> {
    let ids = string_column(batch, TRANSACTION_ID)?;
    let dates = date_column(batch)?;
    let descriptions = string_column(batch, DESCRIPTION)?;
    let amounts = float_column(batch)?;
    let issuers = string_column(batch, STATEMENT_ISSUER)?;
    let categories = optional_string_column(batch, CATEGORY)?;
    let notes = optional_string_column(batch, NOTES)?;

    let epoch = epoch();
    for i in 0..batch.num_rows() {
        let transaction_date = if dates.is_null(i) {
            None
        } else {
            Some(epoch + Duration::days(dates.value(i) as i64))
        };
        rows.push(LedgerRow {
            transaction_id: ids.value(i).to_string(),
            transaction_date,
            description: descriptions.value(i).to_string(),
            amount: amounts.value(i),
            statement_issuer: issuers.value(i).to_string(),
            category: value_at(categories, i),
            notes: value_at(notes, i),
        });
    }
    Ok(())
}

fn value_at(column: Option<&StringArray>, i: usize) -> Option<String> {
    let column = column?;
    if column.is_null(i) {
        None
    } else {
        Some(column.value(i).to_string())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let column = batch
        .column_by_name(name)
        .with_context(|| format!("The stored ledger is missing column '{name}'"))?;
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("Ledger column '{name}' has an unexpected type"))
}

fn optional_string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<Option<&'a StringArray>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .map(Some)
        .with_context(|| format!("Ledger column '{name}' has an unexpected type"))
}

fn date_column(batch: &RecordBatch) -> Result<&Date32Array> {
    let column = batch
        .column_by_name(TRANSACTION_DATE)
        .with_context(|| format!("The stored ledger is missing column '{TRANSACTION_DATE}'"))?;
    column
        .as_any()
        .downcast_ref::<Date32Array>()
        .with_context(|| format!("Ledger column '{TRANSACTION_DATE}' has an unexpected type"))
}

fn float_column(batch: &RecordBatch) -> Result<&Float64Array> {
    let column = batch
        .column_by_name(AMOUNT)
        .with_context(|| format!("The stored ledger is missing column '{AMOUNT}'"))?;
    column
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| format!("Ledger column '{AMOUNT}' has an unexpected type"))
}

/// Store key of a user's master ledger.
pub fn master_key(user: &str) -> String {
    format!("{user}/categorized_expenses.parquet")
}

/// Store key of a pre-merge backup. The name carries the uncategorized and
/// total row counts plus a timestamp formatted so names sort chronologically.
pub fn backup_key(user: &str, uncategorized: usize, rows: usize, at: NaiveDateTime) -> String {
    format!(
        "{user}/backups/{uncategorized}-{rows}__{}.parquet",
        at.format("%Y-%m-%dT%H-%M-%S-%6f")
    )
}

/// Store key of the cleaned (normalized + identified) statement snapshot.
pub fn cleaned_key(user: &str, issuer: &str, from: NaiveDate, to: NaiveDate) -> String {
    format!("{user}/cleaned/{issuer} activity from {from} to {to}.csv")
}

/// Store key of the raw uploaded statement.
pub fn statement_key(user: &str, issuer: &str, filename: &str) -> String {
    format!("{user}/statements/{issuer}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<LedgerRow> {
        vec![
            LedgerRow {
                transaction_id: "id-1".to_string(),
                transaction_date: NaiveDate::from_ymd_opt(2024, 1, 5),
                description: "Coffee Shop".to_string(),
                amount: -5.0,
                statement_issuer: "amex".to_string(),
                category: Some("Dining".to_string()),
                notes: None,
            },
            LedgerRow {
                transaction_id: "id-2".to_string(),
                transaction_date: None,
                description: "Mystery".to_string(),
                amount: -9.99,
                statement_issuer: "chase".to_string(),
                category: None,
                notes: Some("check this one".to_string()),
            },
            LedgerRow {
                transaction_id: "id-3".to_string(),
                transaction_date: NaiveDate::from_ymd_opt(2024, 2, 1),
                description: "Paycheck".to_string(),
                amount: 2500.0,
                statement_issuer: "chase".to_string(),
                category: None,
                notes: None,
            },
        ]
    }

    #[test]
    fn test_parquet_round_trip() {
        let ledger = Ledger::new(sample_rows());
        let bytes = ledger.to_parquet().unwrap();
        let decoded = Ledger::from_parquet(bytes).unwrap();
        assert_eq!(decoded, ledger);
    }

    #[test]
    fn test_empty_ledger_round_trip() {
        let ledger = Ledger::empty();
        let bytes = ledger.to_parquet().unwrap();
        let decoded = Ledger::from_parquet(bytes).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_missing_editable_columns_read_as_null() {
        // A ledger written before category/notes existed.
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSACTION_ID, DataType::Utf8, false),
            Field::new(TRANSACTION_DATE, DataType::Date32, true),
            Field::new(DESCRIPTION, DataType::Utf8, false),
            Field::new(AMOUNT, DataType::Float64, false),
            Field::new(STATEMENT_ISSUER, DataType::Utf8, false),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["id-1"])),
            Arc::new(Date32Array::from(vec![Some(19_727)])),
            Arc::new(StringArray::from(vec!["Coffee Shop"])),
            Arc::new(Float64Array::from(vec![-5.0])),
            Arc::new(StringArray::from(vec!["amex"])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ledger = Ledger::from_parquet(buffer).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.rows()[0].category, None);
        assert_eq!(ledger.rows()[0].notes, None);
        assert_eq!(ledger.uncategorized_count(), 1);
    }

    #[test]
    fn test_uncategorized_count() {
        let ledger = Ledger::new(sample_rows());
        assert_eq!(ledger.uncategorized_count(), 2);
    }

    #[test]
    fn test_latest_dates_by_issuer() {
        let ledger = Ledger::new(sample_rows());
        let latest = ledger.latest_dates_by_issuer();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["amex"], NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        // The null-dated chase row does not contribute.
        assert_eq!(
            latest["chase"],
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_date_range_skips_null_dates() {
        let ledger = Ledger::new(sample_rows());
        let (from, to) = ledger.date_range().unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn test_date_range_empty() {
        assert!(Ledger::empty().date_range().is_none());
    }

    #[test]
    fn test_master_key_layout() {
        assert_eq!(master_key("alice"), "alice/categorized_expenses.parquet");
    }

    #[test]
    fn test_backup_keys_sort_chronologically() {
        let earlier = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(9, 30, 0, 12)
            .unwrap();
        let later = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(17, 5, 59, 999_999)
            .unwrap();
        let a = backup_key("alice", 4, 120, earlier);
        let b = backup_key("alice", 9, 150, later);
        assert!(a.starts_with("alice/backups/4-120__2024-03-01T09-30-00-"));
        assert!(a.ends_with(".parquet"));
        // Counts differ but the timestamp portion decides the order.
        let ts = |k: &str| k.split("__").nth(1).unwrap().to_string();
        assert!(ts(&a) < ts(&b));
    }

    #[test]
    fn test_cleaned_key_layout() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            cleaned_key("alice", "amex", from, to),
            "alice/cleaned/amex activity from 2024-01-05 to 2024-01-31.csv"
        );
    }
}
