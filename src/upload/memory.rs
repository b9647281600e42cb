//! In-memory object store with failure injection

use super::object_store::{blob_key, ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A stored blob
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store that keeps blobs in a map.
///
/// Puts and deletes can be made to fail so the upload saga's rollback path
/// can be exercised.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    put_delay: Option<Duration>,
    deletes: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent put fails
    pub fn with_failing_puts(self) -> Self {
        self.fail_puts.store(true, Ordering::Relaxed);
        self
    }

    /// Every subsequent delete fails
    pub fn with_failing_deletes(self) -> Self {
        self.fail_deletes.store(true, Ordering::Relaxed);
        self
    }

    /// Hold every put for `delay` before storing (to keep an upload in flight)
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<StoredBlob> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys passed to `delete`, in call order (including failed attempts)
    pub fn delete_calls(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: &[u8], name: &str, content_type: &str) -> Result<String, ObjectStoreError> {
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_puts.load(Ordering::Relaxed) {
            return Err(ObjectStoreError::Put(format!(
                "memory store configured to fail puts ({})",
                name
            )));
        }
        let key = blob_key("memory", name);
        self.blobs.lock().unwrap().insert(
            key.clone(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.deletes.lock().unwrap().push(key.to_string());
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(ObjectStoreError::Delete(format!(
                "memory store configured to fail deletes ({})",
                key
            )));
        }
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}
