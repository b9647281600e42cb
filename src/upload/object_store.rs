//! Object store contract for document blobs

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

/// Errors from blob storage. Any of these is fatal to the current upload.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("put failed: {0}")]
    Put(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage behind a put/delete contract.
///
/// Abstracts over the provider (local disk, S3-compatible bucket, GCS) so
/// the upload saga doesn't depend on where bytes end up.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` and return a durable key for them.
    async fn put(&self, bytes: &[u8], name: &str, content_type: &str) -> Result<String, ObjectStoreError>;

    /// Remove a blob. Deleting a key that is already gone succeeds.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// Build a blob key: `{prefix}/{unix_millis}-{short_id}-{file_name}`.
///
/// Only the final path component of `name` is kept; the short id keeps two
/// uploads of the same file within one millisecond apart.
pub fn blob_key(prefix: &str, name: &str) -> String {
    let file_name = name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("document");
    let short_id = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}-{}-{}",
        prefix.trim_matches('/'),
        Utc::now().timestamp_millis(),
        &short_id[..8],
        file_name
    )
}

/// Reject keys that would escape the store's root.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let escapes = key.is_empty()
        || key.starts_with('/')
        || key.starts_with('\\')
        || key.split(['/', '\\']).any(|part| part == "..");
    if escapes {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
