//! Issuer schema registry.
//!
//! Each supported issuer maps to the column layout and sign convention of
//! its statement export. The registry is read-only after construction: it is
//! either the built-in table or a JSON document fetched once from the store,
//! with the built-ins as the fallback when no document has been published.
//! Field names in the document keep their historical spelling
//! (`DATE_COLUMN`, `EXPENSES_SIGN`, ...).

use crate::error::PipelineError;
use crate::store::BlobStore;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Store key of the issuer schema document.
pub const ISSUERS_KEY: &str = "config/issuers.json";

/// Column layout and sign convention for one issuer's statement export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSchema {
    /// Source column holding the transaction date.
    #[serde(rename = "DATE_COLUMN")]
    date_column: String,

    #[serde(rename = "DESCRIPTION_COLUMN")]
    description_column: String,

    #[serde(rename = "AMOUNT_COLUMN")]
    amount_column: String,

    /// Multiplier applied to raw amounts so expenses come out negative.
    /// Issuers that report expenses as positive numbers use `-1`.
    #[serde(rename = "EXPENSES_SIGN")]
    expense_sign: i8,
}

impl IssuerSchema {
    pub fn new(
        date_column: impl Into<String>,
        description_column: impl Into<String>,
        amount_column: impl Into<String>,
        expense_sign: i8,
    ) -> Self {
        Self {
            date_column: date_column.into(),
            description_column: description_column.into(),
            amount_column: amount_column.into(),
            expense_sign,
        }
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn description_column(&self) -> &str {
        &self.description_column
    }

    pub fn amount_column(&self) -> &str {
        &self.amount_column
    }

    pub fn expense_sign(&self) -> i8 {
        self.expense_sign
    }

    /// All three columns present and the sign restricted to plus or minus one.
    fn validate(&self, issuer: &str) -> Result<()> {
        anyhow::ensure!(
            !self.date_column.is_empty()
                && !self.description_column.is_empty()
                && !self.amount_column.is_empty(),
            "issuer '{issuer}' has an empty column name in its schema"
        );
        anyhow::ensure!(
            self.expense_sign == 1 || self.expense_sign == -1,
            "issuer '{issuer}' has an invalid expense sign {} (must be 1 or -1)",
            self.expense_sign
        );
        Ok(())
    }
}

/// Read-only lookup from issuer id to [`IssuerSchema`].
#[derive(Debug, Clone)]
pub struct Registry {
    issuers: BTreeMap<String, IssuerSchema>,
}

impl Registry {
    /// The built-in issuer table.
    pub fn builtin() -> Self {
        let mut issuers = BTreeMap::new();
        issuers.insert(
            "amazon".to_string(),
            IssuerSchema::new("Transaction Date", "Description", "Amount", 1),
        );
        // Amex statements have expenses as positive amounts.
        issuers.insert(
            "amex".to_string(),
            IssuerSchema::new("Date", "Description", "Amount", -1),
        );
        issuers.insert(
            "chase".to_string(),
            IssuerSchema::new("Transaction Date", "Description", "Amount", 1),
        );
        issuers.insert(
            "chase_debit".to_string(),
            IssuerSchema::new("Posting Date", "Description", "Amount", 1),
        );
        issuers.insert(
            "rbc".to_string(),
            IssuerSchema::new("Transaction Date", "Description", "Amount", 1),
        );
        Self { issuers }
    }

    /// Parses a registry from an issuer document (a JSON object keyed by
    /// issuer id). Every schema is validated; an invalid document is an
    /// error, never a silent fallback.
    pub fn from_document(bytes: &[u8]) -> Result<Self> {
        let issuers: BTreeMap<String, IssuerSchema> =
            serde_json::from_slice(bytes).context("Unable to parse the issuer document")?;
        for (issuer, schema) in &issuers {
            schema.validate(issuer)?;
        }
        Ok(Self { issuers })
    }

    /// Loads the issuer document from the store, falling back to the
    /// built-in table when none has been published.
    pub async fn from_store(store: &dyn BlobStore, key: &str) -> Result<Self> {
        match store.get(key).await {
            Ok(bytes) => {
                let registry = Self::from_document(&bytes)?;
                info!(
                    "Loaded {} issuer schemas from '{key}'",
                    registry.issuers.len()
                );
                Ok(registry)
            }
            Err(e) if e.is_not_found() => {
                debug!("No issuer document at '{key}', using built-in table");
                Ok(Self::builtin())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up the schema for `issuer`. The match is case-sensitive;
    /// callers lower-case the id first.
    pub fn get(&self, issuer: &str) -> std::result::Result<&IssuerSchema, PipelineError> {
        self.issuers
            .get(issuer)
            .ok_or_else(|| PipelineError::UnknownIssuer {
                issuer: issuer.to_string(),
            })
    }

    /// Registered issuer ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.issuers.keys().map(String::as_str)
    }

    /// Registered issuers and their schemas, sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IssuerSchema)> {
        self.issuers.iter().map(|(id, schema)| (id.as_str(), schema))
    }

    /// Serializes the registry to the issuer document format.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.issuers)
            .context("Unable to serialize the issuer document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_table() {
        let registry = Registry::builtin();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["amazon", "amex", "chase", "chase_debit", "rbc"]);

        let amex = registry.get("amex").unwrap();
        assert_eq!(amex.date_column(), "Date");
        assert_eq!(amex.expense_sign(), -1);

        let chase_debit = registry.get("chase_debit").unwrap();
        assert_eq!(chase_debit.date_column(), "Posting Date");
        assert_eq!(chase_debit.expense_sign(), 1);
    }

    #[test]
    fn test_unknown_issuer() {
        let registry = Registry::builtin();
        let err = registry.get("acme").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownIssuer { .. }));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = Registry::builtin();
        assert!(registry.get("Amex").is_err());
        assert!(registry.get("amex").is_ok());
    }

    #[test]
    fn test_document_round_trip() {
        let registry = Registry::builtin();
        let doc = registry.to_document().unwrap();
        let parsed = Registry::from_document(&doc).unwrap();
        assert_eq!(parsed.get("rbc").unwrap(), registry.get("rbc").unwrap());
    }

    #[test]
    fn test_document_field_spelling() {
        let doc = br#"{
            "acme": {
                "DATE_COLUMN": "Posted",
                "DESCRIPTION_COLUMN": "Memo",
                "AMOUNT_COLUMN": "Value",
                "EXPENSES_SIGN": -1
            }
        }"#;
        let registry = Registry::from_document(doc).unwrap();
        let schema = registry.get("acme").unwrap();
        assert_eq!(schema.description_column(), "Memo");
        assert_eq!(schema.expense_sign(), -1);
    }

    #[test]
    fn test_invalid_sign_rejected() {
        let doc = br#"{
            "acme": {
                "DATE_COLUMN": "Posted",
                "DESCRIPTION_COLUMN": "Memo",
                "AMOUNT_COLUMN": "Value",
                "EXPENSES_SIGN": 2
            }
        }"#;
        assert!(Registry::from_document(doc).is_err());
    }

    #[test]
    fn test_empty_column_rejected() {
        let doc = br#"{
            "acme": {
                "DATE_COLUMN": "",
                "DESCRIPTION_COLUMN": "Memo",
                "AMOUNT_COLUMN": "Value",
                "EXPENSES_SIGN": 1
            }
        }"#;
        assert!(Registry::from_document(doc).is_err());
    }

    #[tokio::test]
    async fn test_from_store_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let registry = Registry::from_store(&store, ISSUERS_KEY).await.unwrap();
        assert!(registry.get("chase").is_ok());
    }

    #[tokio::test]
    async fn test_from_store_prefers_document() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let doc = br#"{
            "localbank": {
                "DATE_COLUMN": "When",
                "DESCRIPTION_COLUMN": "What",
                "AMOUNT_COLUMN": "How Much",
                "EXPENSES_SIGN": 1
            }
        }"#;
        store.put(ISSUERS_KEY, doc).await.unwrap();

        let registry = Registry::from_store(&store, ISSUERS_KEY).await.unwrap();
        assert!(registry.get("localbank").is_ok());
        // The document replaces the built-ins entirely.
        assert!(registry.get("chase").is_err());
    }

    #[tokio::test]
    async fn test_from_store_rejects_bad_document() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        store.put(ISSUERS_KEY, b"not json").await.unwrap();
        assert!(Registry::from_store(&store, ISSUERS_KEY).await.is_err());
    }
}
