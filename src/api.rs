//! Transport-independent API layer.
//!
//! `LeaseApi` is the single entry point for consumer-facing operations.
//! Transports (the CLI today, an HTTP layer later) call `LeaseApi` methods;
//! they never reach into `VersionStore` or `UploadCoordinator` directly.

use std::path::Path;
use std::sync::Arc;

use crate::aggregate::{AggregateError, Aggregation, ChunkAggregator, DirectoryFragments};
use crate::config::Config;
use crate::details::details_from_json;
use crate::ledger::{
    Group, GroupId, LedgerError, LedgerResult, OwnerId, Snapshot, TimelineEntry, VersionStore,
};
use crate::storage::{LeaseStore, OpenStore, SqliteStore, StorageResult};
use crate::upload::{
    DocumentMetadata, LocalObjectStore, ObjectStore, SubmitOutcome, UploadCoordinator,
};

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct LeaseApi {
    versions: VersionStore,
    uploads: UploadCoordinator,
}

impl LeaseApi {
    pub fn new(store: Arc<dyn LeaseStore>, objects: Arc<dyn ObjectStore>) -> Self {
        let versions = VersionStore::new(store);
        let uploads = UploadCoordinator::new(versions.clone(), objects);
        Self { versions, uploads }
    }

    /// SQLite store and local object store at the configured paths.
    pub fn open(config: &Config) -> StorageResult<Self> {
        config.ensure_dirs()?;
        let store = SqliteStore::open(&config.db_path)?;
        let objects = LocalObjectStore::new(&config.blob_root, config.key_prefix.clone());
        Ok(Self::new(Arc::new(store), Arc::new(objects)))
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    // --- Groups ---

    pub fn create_group(&self, owner: &OwnerId, name: &str) -> LedgerResult<Group> {
        self.versions.create_group(owner, name)
    }

    pub fn groups(&self, owner: &OwnerId) -> LedgerResult<Vec<Group>> {
        self.versions.groups(owner)
    }

    // --- Write ---

    /// Upload a document and advance its group's version chain.
    pub async fn submit(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        blob: Vec<u8>,
        metadata: DocumentMetadata,
        delta: serde_json::Value,
    ) -> LedgerResult<SubmitOutcome> {
        self.uploads
            .submit(owner.clone(), group.clone(), blob, metadata, delta)
            .await
    }

    /// Correct a historical version in place (mutates history).
    pub fn amend(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
        delta: serde_json::Value,
    ) -> LedgerResult<Snapshot> {
        self.versions.resolve_group(owner, group)?;
        let delta = details_from_json(delta)
            .map_err(|e| LedgerError::InvalidInput(format!("delta: {}", e)))?;
        self.versions.amend_version(owner, group, version, &delta)
    }

    // --- Read ---

    pub fn timeline(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Vec<TimelineEntry>> {
        self.versions.resolve_group(owner, group)?;
        self.versions.timeline(owner, group)
    }

    /// A specific version, or the active one when `version` is `None`.
    pub fn show(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: Option<u32>,
    ) -> LedgerResult<Snapshot> {
        self.versions.resolve_group(owner, group)?;
        let snapshot = match version {
            Some(v) => self.versions.get_by_version_number(owner, group, v)?,
            None => self.versions.get_active(owner, group)?,
        };
        snapshot.ok_or_else(|| match version {
            Some(v) => LedgerError::NotFound(format!("version {} of group {}", v, group)),
            None => LedgerError::NotFound(format!("group {} has no versions yet", group)),
        })
    }

    pub fn history(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Vec<Snapshot>> {
        self.versions.resolve_group(owner, group)?;
        self.versions.history(owner, group)
    }

    // --- Aggregation ---

    /// Fold a directory of numbered fragments and remove it.
    pub fn aggregate_directory(dir: &Path) -> Result<Aggregation, AggregateError> {
        let mut source = DirectoryFragments::open(dir)?;
        ChunkAggregator::new().run(&mut source)
    }
}
