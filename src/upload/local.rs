//! Filesystem-backed object store

use super::object_store::{blob_key, validate_key, ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Stores blobs as files under a root directory, one file per key.
pub struct LocalObjectStore {
    root: PathBuf,
    prefix: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file backing `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: &[u8], name: &str, _content_type: &str) -> Result<String, ObjectStoreError> {
        let key = blob_key(&self.prefix, name);
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ObjectStoreError::Put(format!("{}: {}", path.display(), e)))?;
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjectStoreError::Delete(format!("{}: {}", path.display(), e))),
        }
    }
}
