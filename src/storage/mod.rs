//! Blob store for uploaded photos.
//!
//! Photos live on disk only for the duration of one extraction attempt.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;

/// Persists blobs and deletes them again.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write the bytes to a new file and return its path.
    async fn save(&self, bytes: &[u8]) -> Result<PathBuf, StorageError>;

    /// Delete a file previously returned by `save`. Missing files are fine.
    async fn delete(&self, path: &Path) -> Result<(), StorageError>;
}

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.root.join(format!("{}.jpg", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Blob saved");
        Ok(path)
    }

    async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        if !path.starts_with(&self.root) {
            return Err(StorageError::OutsideStore(path.display().to_string()));
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
