//! Statement normalization.
//!
//! Reads a raw CSV statement export through an [`IssuerSchema`] and produces
//! canonical [`NormalizedTransaction`] rows in input order. Dates and
//! amounts fail differently on purpose: a bad date becomes a counted null
//! and the row is kept, while a bad amount rejects the entire file, because
//! amount correctness is financially load-bearing and date gaps are
//! recoverable through review.

use crate::error::PipelineError;
use crate::issuers::IssuerSchema;
use crate::model::{Amount, NormalizedTransaction};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Read;
use std::str::FromStr;
use tracing::warn;

/// Date layouts seen across supported statement exports. The two-digit-year
/// layout comes before the four-digit one because `%Y` will happily parse
/// a two-digit year as the first century.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"];

/// The output of normalization: rows in input order plus the count of rows
/// whose date failed to parse.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub rows: Vec<NormalizedTransaction>,
    pub invalid_dates: usize,
}

/// Normalizes a raw statement.
///
/// The reader must yield UTF-8, comma-delimited CSV whose first row is a
/// header containing at least the three columns named by `schema`. The
/// transform is pure aside from a diagnostic log of the invalid-date count.
pub fn normalize<R: Read>(
    reader: R,
    schema: &IssuerSchema,
    issuer: &str,
) -> Result<Normalized, PipelineError> {
    let mut csv_reader = csv::Reader::from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| PipelineError::InvalidStatement { source: e })?
        .clone();
    let date_ix = column_index(&headers, schema.date_column())?;
    let description_ix = column_index(&headers, schema.description_column())?;
    let amount_ix = column_index(&headers, schema.amount_column())?;

    let issuer = issuer.to_lowercase();
    let mut rows = Vec::new();
    let mut invalid_dates = 0usize;

    for (ix, record) in csv_reader.records().enumerate() {
        // 1-based row number within the data section, for error messages.
        let row_number = ix + 1;
        let record = record.map_err(|e| PipelineError::InvalidStatement { source: e })?;

        let raw_date = record.get(date_ix).unwrap_or_default();
        let transaction_date = parse_statement_date(raw_date);
        if transaction_date.is_none() {
            invalid_dates += 1;
        }

        let description = record
            .get(description_ix)
            .unwrap_or_default()
            .trim()
            .to_string();

        let raw_amount = record.get(amount_ix).unwrap_or_default();
        let amount =
            Amount::from_str(raw_amount).map_err(|_| PipelineError::MalformedAmount {
                row: row_number,
                value: raw_amount.to_string(),
            })?;

        rows.push(NormalizedTransaction::new(
            transaction_date,
            description,
            amount.signed(schema.expense_sign()),
            issuer.clone(),
        ));
    }

    if invalid_dates > 0 {
        warn!("{invalid_dates} rows had invalid dates and were set to null");
    }

    Ok(Normalized {
        rows,
        invalid_dates,
    })
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, PipelineError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| PipelineError::MissingColumn {
            column: column.to_string(),
        })
}

/// Parses a statement date value, trying the known layouts and an ISO
/// datetime. Returns `None` when nothing matches.
fn parse_statement_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.date());
    }
    None
}
