//! Upload coordinator: blob upload + document record + version advance
//!
//! The object store and the structured store are different systems, so a
//! submission is a saga rather than one transaction:
//!
//! 1. Validate kind, delta, and file (before any I/O)
//! 2. Resolve the group (must exist and belong to the caller)
//! 3. Upload the blob (outside the transaction)
//! 4. Stage the document record and the next version into one `ChangeSet`
//! 5. Commit it atomically
//!
//! If 4 or 5 fails, the uploaded blob is deleted. A failed delete is logged and
//! never replaces the original error. Uploading first means a rollback only
//! ever leaves an orphaned blob behind, never a record pointing at a
//! missing one.

use super::object_store::ObjectStore;
use crate::details::{details_from_json, Details};
use crate::ledger::{
    DocumentId, DocumentKind, DocumentRecord, GroupId, LedgerError, LedgerResult, OwnerId,
    VersionStore,
};
use crate::storage::ChangeSet;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Client-declared metadata for an uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Original file name
    pub name: String,
    /// Declared kind; must be one of the accepted `DocumentKind`s
    pub kind: String,
    pub content_type: String,
}

impl DocumentMetadata {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            content_type: "application/pdf".to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// What a successful submission produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub version: u32,
    pub document_id: DocumentId,
}

/// A submission that passed validation.
struct ValidatedSubmission {
    kind: DocumentKind,
    delta: Details,
}

type GroupLocks = DashMap<(OwnerId, GroupId), Arc<tokio::sync::Mutex<()>>>;

/// Runs document submissions as upload-then-commit sagas.
///
/// Submissions for the same (owner, group) are serialized in-process by a
/// per-group lock; across processes the store's unique keys turn a race into
/// `LedgerError::Conflict`. A group's lock entry lives only while some
/// submission for it is in flight.
#[derive(Clone)]
pub struct UploadCoordinator {
    versions: VersionStore,
    objects: Arc<dyn ObjectStore>,
    locks: Arc<GroupLocks>,
}

impl UploadCoordinator {
    pub fn new(versions: VersionStore, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            versions,
            objects,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Submit a document and the delta it contributes.
    ///
    /// The saga runs on its own task, so dropping the returned future (a
    /// disconnected client) still lets it finish in full commit or full
    /// rollback.
    pub async fn submit(
        &self,
        owner: OwnerId,
        group: GroupId,
        blob: Vec<u8>,
        metadata: DocumentMetadata,
        delta: serde_json::Value,
    ) -> LedgerResult<SubmitOutcome> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .run_saga(&owner, &group, &blob, &metadata, delta)
                .await
        })
        .await
        .map_err(|e| LedgerError::Internal(format!("submission task failed: {}", e)))?
    }

    fn validate(
        blob: &[u8],
        metadata: &DocumentMetadata,
        delta: serde_json::Value,
    ) -> LedgerResult<ValidatedSubmission> {
        let kind: DocumentKind = metadata.kind.parse().map_err(LedgerError::InvalidInput)?;
        let delta = details_from_json(delta)
            .map_err(|e| LedgerError::InvalidInput(format!("delta: {}", e)))?;
        if metadata.name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("document name is required".into()));
        }
        if blob.is_empty() {
            return Err(LedgerError::InvalidInput("document file is required".into()));
        }
        Ok(ValidatedSubmission { kind, delta })
    }

    async fn run_saga(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        blob: &[u8],
        metadata: &DocumentMetadata,
        delta: serde_json::Value,
    ) -> LedgerResult<SubmitOutcome> {
        let submission = Self::validate(blob, metadata, delta)?;
        self.versions.resolve_group(owner, group)?;

        let key = (owner.clone(), group.clone());
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.upload_and_commit(owner, group, blob, metadata, submission)
                .await
        };

        // Drop the group's lock entry once no other submission holds or awaits it
        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    async fn upload_and_commit(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        blob: &[u8],
        metadata: &DocumentMetadata,
        submission: ValidatedSubmission,
    ) -> LedgerResult<SubmitOutcome> {
        let blob_key = self
            .objects
            .put(blob, &metadata.name, &metadata.content_type)
            .await?;
        info!(group = %group, key = %blob_key, "uploaded document blob");

        match self.commit_document(owner, group, &blob_key, metadata, submission) {
            Ok(outcome) => {
                info!(
                    group = %group,
                    version = outcome.version,
                    document = %outcome.document_id,
                    "committed document version"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(group = %group, error = %err, key = %blob_key, "commit failed, deleting uploaded blob");
                if let Err(cleanup) = self.objects.delete(&blob_key).await {
                    warn!(key = %blob_key, error = %cleanup, "storage rollback failed, blob orphaned");
                }
                Err(err)
            }
        }
    }

    /// Stage the document record and the next snapshot, then commit them together.
    fn commit_document(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        blob_key: &str,
        metadata: &DocumentMetadata,
        submission: ValidatedSubmission,
    ) -> LedgerResult<SubmitOutcome> {
        let document = DocumentRecord {
            id: DocumentId::new(),
            owner_id: owner.clone(),
            group_id: group.clone(),
            name: metadata.name.trim().to_string(),
            kind: submission.kind,
            blob_key: blob_key.to_string(),
            content_type: metadata.content_type.clone(),
            created_at: Utc::now(),
        };
        let document_id = document.id.clone();

        let mut changes = ChangeSet::new();
        changes.insert_document(document);

        let snapshot = if self.versions.get_active(owner, group)?.is_some() {
            self.versions
                .stage_advance(&mut changes, owner, group, &submission.delta, &document_id)?
        } else {
            self.versions.stage_initial(
                &mut changes,
                owner,
                group,
                submission.delta,
                Some(&document_id),
            )?
        };

        self.versions.store().commit(changes)?;

        Ok(SubmitOutcome {
            version: snapshot.version,
            document_id,
        })
    }
}
