//! The canonical, issuer-independent transaction representation.

use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A statement row after normalization.
///
/// Produced by the normalizer without a `transaction_id`; the identity
/// assigner fills it in before the merge stage. A `None` transaction date
/// means the source value failed to parse; the row is retained and the
/// failure is counted, not fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub transaction_id: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub description: String,
    pub amount: Amount,
    pub statement_issuer: String,
}

impl NormalizedTransaction {
    pub fn new(
        transaction_date: Option<NaiveDate>,
        description: impl Into<String>,
        amount: Amount,
        statement_issuer: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: None,
            transaction_date,
            description: description.into(),
            amount,
            statement_issuer: statement_issuer.into(),
        }
    }
}
