//! The blob store contract that the ingest pipeline runs against.
//!
//! The pipeline only ever sees a key-value object store with `get`, `put`,
//! `copy` and `list`. A missing object is a distinct, recoverable condition
//! (a ledger that does not exist yet is a valid initial state), while every
//! other failure is fatal to the current invocation and left to the caller's
//! retry policy.

mod fs;

use async_trait::async_trait;
use thiserror::Error;

pub use fs::FsStore;

/// Errors surfaced by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist. Callers decide whether this is
    /// an error; for the master ledger it means "start fresh".
    #[error("object '{key}' was not found")]
    NotFound { key: String },

    /// Any other storage failure (permissions, disk, transport). Always
    /// fatal to the current invocation.
    #[error("storage error for object '{key}'")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// An opaque key-value blob store.
///
/// Keys are `/`-separated paths. Implementations must make `put` effectively
/// atomic per object: readers observe either the previous object or the new
/// one, never a partial write.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads the full contents of the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes `bytes` to `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Copies the object at `src` to `dst`, byte for byte.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    /// Lists the keys of all objects whose key starts with `prefix`,
    /// in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
