use crate::commands::Out;
use crate::issuers::{IssuerSchema, Registry, ISSUERS_KEY};
use crate::store::FsStore;
use crate::{Config, Result};
use serde::Serialize;

/// One row of the issuer listing.
#[derive(Debug, Clone, Serialize)]
pub struct IssuerInfo {
    pub id: String,
    pub date_column: String,
    pub description_column: String,
    pub amount_column: String,
    pub expense_sign: i8,
}

impl IssuerInfo {
    fn new(id: &str, schema: &IssuerSchema) -> Self {
        Self {
            id: id.to_string(),
            date_column: schema.date_column().to_string(),
            description_column: schema.description_column().to_string(),
            amount_column: schema.amount_column().to_string(),
            expense_sign: schema.expense_sign(),
        }
    }
}

/// Lists the registered issuers and their statement schemas.
pub async fn issuers(config: &Config) -> Result<Out<Vec<IssuerInfo>>> {
    let store = FsStore::open(config.store_root()).await?;
    let registry = Registry::from_store(&store, ISSUERS_KEY).await?;

    let listing: Vec<IssuerInfo> = registry
        .iter()
        .map(|(id, schema)| IssuerInfo::new(id, schema))
        .collect();

    let ids: Vec<&str> = listing.iter().map(|i| i.id.as_str()).collect();
    Ok(Out::new(
        format!("{} registered issuers: {}", ids.len(), ids.join(", ")),
        listing,
    ))
}
