use crate::args::StatusArgs;
use crate::commands::Out;
use crate::ledger::{self, Ledger};
use crate::report::StatusSummary;
use crate::store::{BlobStore, FsStore};
use crate::{Config, Result};

/// Read-only summary of a user's ledger. A missing ledger is not an error;
/// it reports an empty state.
pub async fn status(config: &Config, args: &StatusArgs) -> Result<Out<StatusSummary>> {
    let store = FsStore::open(config.store_root()).await?;

    let ledger = match store.get(&ledger::master_key(args.user())).await {
        Ok(bytes) => Ledger::from_parquet(bytes)?,
        Err(e) if e.is_not_found() => Ledger::empty(),
        Err(e) => return Err(e.into()),
    };

    let summary = StatusSummary::from_ledger(args.user(), &ledger);
    Ok(Out::new(summary.message(), summary))
}
