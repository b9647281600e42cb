//! Shared fixtures for the scenario tests
//!
//! Builds an in-memory ledger with a memory object store so scenarios can
//! inspect both sides of an upload.

#![allow(dead_code)]

use leaseline::{
    DocumentMetadata, GroupId, LeaseApi, MemoryObjectStore, OpenStore, OwnerId, SqliteStore,
    SubmitOutcome,
};
use serde_json::Value;
use std::sync::Arc;

pub struct Ledger {
    pub api: LeaseApi,
    pub objects: Arc<MemoryObjectStore>,
    pub owner: OwnerId,
    pub group: GroupId,
}

impl Ledger {
    /// Fresh store, one owner, one empty group
    pub fn new() -> Self {
        Self::with_objects(MemoryObjectStore::new())
    }

    pub fn with_objects(objects: MemoryObjectStore) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
        let objects = Arc::new(objects);
        let api = LeaseApi::new(store, objects.clone());
        let owner = OwnerId::from("tenant-co");
        let group = api
            .create_group(&owner, "100 Main St, Suite 200")
            .expect("create group")
            .id;
        Self {
            api,
            objects,
            owner,
            group,
        }
    }

    pub async fn submit(&self, name: &str, kind: &str, delta: Value) -> SubmitOutcome {
        self.api
            .submit(
                &self.owner,
                &self.group,
                format!("%PDF {}", name).into_bytes(),
                DocumentMetadata::new(name, kind),
                delta,
            )
            .await
            .expect("submit")
    }
}

/// Fragment text wrapped in a fenced block, as extractors tend to return it
pub fn fenced(value: &Value) -> String {
    format!("```json\n{}\n```", value)
}
