use crate::args::InitArgs;
use crate::commands::Out;
use crate::issuers::{Registry, ISSUERS_KEY};
use crate::store::{BlobStore, FsStore};
use crate::{Config, Result};
use std::path::Path;

/// Creates the ledger home directory, writes the initial configuration, and
/// seeds the store with the built-in issuer document so it can be edited in
/// place to add issuers.
pub async fn init(home: &Path, args: &InitArgs) -> Result<Out<()>> {
    let config = Config::create(home, args.store().cloned()).await?;

    let store = FsStore::open(config.store_root()).await?;
    let document = Registry::builtin().to_document()?;
    store.put(ISSUERS_KEY, &document).await?;

    Ok(Out::new_message(format!(
        "Initialized ledger home at '{}' with store at '{}'",
        config.root().display(),
        config.store_root().display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_home_and_issuer_document() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger_home");

        let out = init(&home, &InitArgs::new(None)).await.unwrap();
        assert!(out.message().contains("Initialized ledger home"));

        let config = Config::load(&home).await.unwrap();
        let store = FsStore::open(config.store_root()).await.unwrap();
        let registry = Registry::from_store(&store, ISSUERS_KEY).await.unwrap();
        assert!(registry.get("amex").is_ok());
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger_home");
        init(&home, &InitArgs::new(None)).await.unwrap();
        assert!(init(&home, &InitArgs::new(None)).await.is_err());
    }
}
