//! A local-filesystem implementation of the [`BlobStore`] contract.
//!
//! Keys map to paths beneath a root directory. Writes go through a temp file
//! and a rename so a reader never observes a half-written object.

use crate::store::{BlobStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Blob store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens (and creates, if necessary) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| StoreError::Io {
            key: root.to_string_lossy().into_owned(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path under the root, rejecting traversal segments.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = PathBuf::from(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || traversal {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "invalid object key"),
            });
        }
        Ok(self.root.join(relative))
    }

    fn map_io(key: &str, e: std::io::Error) -> StoreError {
        match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            _ => StoreError::Io {
                key: key.to_string(),
                source: e,
            },
        }
    }

    async fn ensure_parent(&self, path: &Path, key: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io {
                    key: key.to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| Self::map_io(key, e))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.ensure_parent(&path, key).await?;

        // Write to a sibling temp file, then rename over the target.
        let tmp = path.with_extension("tmp-write");
        fs::write(&tmp, bytes).await.map_err(|e| StoreError::Io {
            key: key.to_string(),
            source: e,
        })?;
        fs::rename(&tmp, &path).await.map_err(|e| StoreError::Io {
            key: key.to_string(),
            source: e,
        })
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let src_path = self.path_for(src)?;
        let dst_path = self.path_for(dst)?;
        self.ensure_parent(&dst_path, dst).await?;
        fs::copy(&src_path, &dst_path)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_io(src, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StoreError::Io {
                        key: prefix.to_string(),
                        source: e,
                    })
                }
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
                key: prefix.to_string(),
                source: e,
            })? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
