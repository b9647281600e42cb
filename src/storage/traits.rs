//! Storage trait definitions

use crate::details::Details;
use crate::ledger::{
    DocumentId, DocumentRecord, Group, GroupId, OwnerId, Snapshot, TimelineEntry,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    /// A unique key was violated or the expected active version moved on
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A single write inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertDocument(DocumentRecord),
    /// Clear `is_active` on a version that must currently be active
    Deactivate {
        owner_id: OwnerId,
        group_id: GroupId,
        version: u32,
    },
    InsertSnapshot(Snapshot),
}

/// An ordered batch of writes committed as one transaction.
///
/// Either every change becomes visible or none does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&mut self, document: DocumentRecord) {
        self.changes.push(Change::InsertDocument(document));
    }

    pub fn deactivate(&mut self, owner_id: &OwnerId, group_id: &GroupId, version: u32) {
        self.changes.push(Change::Deactivate {
            owner_id: owner_id.clone(),
            group_id: group_id.clone(),
            version,
        });
    }

    pub fn insert_snapshot(&mut self, snapshot: Snapshot) {
        self.changes.push(Change::InsertSnapshot(snapshot));
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Trait for structured storage backends
///
/// Implementations must be thread-safe (Send + Sync) and must enforce
/// unique (owner, group, version) and (owner, group, source document) keys,
/// plus at most one active snapshot per (owner, group).
pub trait LeaseStore: Send + Sync {
    // === Group Operations ===

    /// Create or update a group
    fn save_group(&self, group: &Group) -> StorageResult<()>;

    /// Load a group by ID regardless of owner
    fn load_group(&self, id: &GroupId) -> StorageResult<Option<Group>>;

    /// List an owner's groups, oldest first
    fn list_groups(&self, owner: &OwnerId) -> StorageResult<Vec<Group>>;

    // === Document Operations ===

    fn load_document(&self, id: &DocumentId) -> StorageResult<Option<DocumentRecord>>;

    /// List a group's documents, oldest first
    fn list_documents(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<DocumentRecord>>;

    // === Snapshot Operations ===

    fn active_snapshot(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Option<Snapshot>>;

    fn snapshot_by_version(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
    ) -> StorageResult<Option<Snapshot>>;

    fn snapshot_by_document(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        document: &DocumentId,
    ) -> StorageResult<Option<Snapshot>>;

    /// Highest version number in the chain, if any snapshot exists
    fn latest_version(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Option<u32>>;

    /// Every snapshot in the chain, highest version first
    fn list_snapshots(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<Snapshot>>;

    /// Versions joined with their source documents, highest version first
    fn timeline(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<TimelineEntry>>;

    /// Overwrite the details of an existing version in place.
    ///
    /// Returns false if the version does not exist.
    fn replace_details(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
        details: &Details,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    // === Transactions ===

    /// Apply a change set atomically.
    ///
    /// A `Deactivate` that matches no active row, or any unique-key
    /// violation, aborts the whole set with `StorageError::Conflict`.
    fn commit(&self, changes: ChangeSet) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: LeaseStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
