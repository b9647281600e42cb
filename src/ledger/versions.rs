//! VersionStore: the append-only snapshot chain of one (owner, group)

use super::error::{LedgerError, LedgerResult};
use super::ids::{DocumentId, GroupId, OwnerId};
use super::records::{Group, Snapshot, TimelineEntry};
use crate::details::{merge, Details};
use crate::storage::{ChangeSet, LeaseStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns version-chain semantics on top of a `LeaseStore`.
///
/// Every chain is keyed by (owner, group). Versions start at 1, grow by one
/// per source document, and exactly one of them is active once the chain
/// exists. `stage_*` methods add their writes to a caller-owned `ChangeSet`
/// so they can share a transaction with other writes (see
/// `UploadCoordinator`); the unstaged variants commit on their own.
#[derive(Clone)]
pub struct VersionStore {
    store: Arc<dyn LeaseStore>,
}

impl VersionStore {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Register a new group for an owner
    pub fn create_group(&self, owner: &OwnerId, name: &str) -> LedgerResult<Group> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("group name must not be empty".into()));
        }
        let group = Group::new(owner.clone(), name.trim());
        self.store.save_group(&group)?;
        info!(group = %group.id, owner = %owner, "created group");
        Ok(group)
    }

    /// Resolve a group the caller must own.
    pub fn resolve_group(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Group> {
        let found = self
            .store
            .load_group(group)?
            .ok_or_else(|| LedgerError::NotFound(format!("group {}", group)))?;
        if &found.owner_id != owner {
            return Err(LedgerError::Forbidden(format!(
                "group {} is not owned by {}",
                group, owner
            )));
        }
        Ok(found)
    }

    pub fn groups(&self, owner: &OwnerId) -> LedgerResult<Vec<Group>> {
        Ok(self.store.list_groups(owner)?)
    }

    /// The unique active snapshot, or `None` if the chain was never started
    pub fn get_active(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Option<Snapshot>> {
        Ok(self.store.active_snapshot(owner, group)?)
    }

    pub fn get_by_version_number(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
    ) -> LedgerResult<Option<Snapshot>> {
        Ok(self.store.snapshot_by_version(owner, group, version)?)
    }

    pub fn get_by_source_document(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        document: &DocumentId,
    ) -> LedgerResult<Option<Snapshot>> {
        Ok(self.store.snapshot_by_document(owner, group, document)?)
    }

    /// Start a chain at version 1.
    pub fn create_initial(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        details: Details,
        source_document_id: Option<&DocumentId>,
    ) -> LedgerResult<Snapshot> {
        let mut changes = ChangeSet::new();
        let snapshot =
            self.stage_initial(&mut changes, owner, group, details, source_document_id)?;
        self.store.commit(changes)?;
        Ok(snapshot)
    }

    /// Stage version 1 of a chain that has no snapshots yet.
    pub fn stage_initial(
        &self,
        changes: &mut ChangeSet,
        owner: &OwnerId,
        group: &GroupId,
        details: Details,
        source_document_id: Option<&DocumentId>,
    ) -> LedgerResult<Snapshot> {
        if let Some(latest) = self.store.latest_version(owner, group)? {
            return Err(LedgerError::Conflict(format!(
                "group {} already has {} version(s)",
                group, latest
            )));
        }

        let now = Utc::now();
        let snapshot = Snapshot {
            owner_id: owner.clone(),
            group_id: group.clone(),
            version: 1,
            details,
            source_document_id: source_document_id.cloned(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        changes.insert_snapshot(snapshot.clone());
        debug!(group = %group, "staged initial version");
        Ok(snapshot)
    }

    /// Derive the next version by merging `delta` onto the active snapshot.
    pub fn advance(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        delta: &Details,
        source_document_id: &DocumentId,
    ) -> LedgerResult<Snapshot> {
        let mut changes = ChangeSet::new();
        let snapshot = self.stage_advance(&mut changes, owner, group, delta, source_document_id)?;
        self.store.commit(changes)?;
        Ok(snapshot)
    }

    /// Stage deactivation of the active snapshot plus insertion of its successor.
    ///
    /// The deactivation names the version read here, so if another writer
    /// advances the chain before commit the whole change set fails with
    /// `Conflict`.
    pub fn stage_advance(
        &self,
        changes: &mut ChangeSet,
        owner: &OwnerId,
        group: &GroupId,
        delta: &Details,
        source_document_id: &DocumentId,
    ) -> LedgerResult<Snapshot> {
        let active = self.store.active_snapshot(owner, group)?.ok_or_else(|| {
            LedgerError::PreconditionFailed(format!(
                "group {} has no active version; create the initial version first",
                group
            ))
        })?;

        let now = Utc::now();
        let next = Snapshot {
            owner_id: owner.clone(),
            group_id: group.clone(),
            version: active.version + 1,
            details: merge(&active.details, delta),
            source_document_id: Some(source_document_id.clone()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        changes.deactivate(owner, group, active.version);
        changes.insert_snapshot(next.clone());
        debug!(group = %group, from = active.version, to = next.version, "staged advance");
        Ok(next)
    }

    /// Correct a historical version in place.
    ///
    /// Unlike `advance`, this rewrites an existing snapshot's details and
    /// `updated_at`; version number, activity, and source document stay as
    /// they were. History is mutated, not appended to.
    pub fn amend_version(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
        delta: &Details,
    ) -> LedgerResult<Snapshot> {
        let existing = self
            .store
            .snapshot_by_version(owner, group, version)?
            .ok_or_else(|| LedgerError::NotFound(format!("version {} of group {}", version, group)))?;

        let updated_at = Utc::now();
        let details = merge(&existing.details, delta);
        if !self
            .store
            .replace_details(owner, group, version, &details, updated_at)?
        {
            return Err(LedgerError::NotFound(format!(
                "version {} of group {}",
                version, group
            )));
        }

        info!(group = %group, version, "amended historical version in place");
        Ok(Snapshot {
            details,
            updated_at,
            ..existing
        })
    }

    /// Versions joined with their source documents, newest first
    pub fn timeline(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Vec<TimelineEntry>> {
        Ok(self.store.timeline(owner, group)?)
    }

    /// Every snapshot in the chain, newest first
    pub fn history(&self, owner: &OwnerId, group: &GroupId) -> LedgerResult<Vec<Snapshot>> {
        Ok(self.store.list_snapshots(owner, group)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::{details_from_json, DetailValue};
    use crate::storage::{OpenStore, SqliteStore};
    use serde_json::json;

    fn d(value: serde_json::Value) -> Details {
        details_from_json(value).unwrap()
    }

    fn create_versions() -> (VersionStore, OwnerId, GroupId) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let versions = VersionStore::new(store);
        let owner = OwnerId::from("owner-1");
        let group = versions.create_group(&owner, "Unit 201").unwrap();
        (versions, owner, group.id)
    }

    #[test]
    fn test_get_active_on_uninitialized_group() {
        let (versions, owner, group) = create_versions();
        assert!(versions.get_active(&owner, &group).unwrap().is_none());
    }

    #[test]
    fn test_create_initial_is_version_one_and_active() {
        let (versions, owner, group) = create_versions();
        let snapshot = versions
            .create_initial(&owner, &group, d(json!({"rent": 100})), None)
            .unwrap();

        assert_eq!(snapshot.version, 1);
        assert!(snapshot.is_active);
        assert!(snapshot.source_document_id.is_none());
        assert_eq!(versions.get_active(&owner, &group).unwrap().unwrap(), snapshot);
    }

    #[test]
    fn test_create_initial_twice_is_conflict() {
        let (versions, owner, group) = create_versions();
        versions
            .create_initial(&owner, &group, d(json!({"rent": 100})), None)
            .unwrap();

        let err = versions
            .create_initial(&owner, &group, d(json!({"rent": 200})), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn test_advance_without_active_is_precondition_failed() {
        let (versions, owner, group) = create_versions();
        let err = versions
            .advance(&owner, &group, &d(json!({"rent": 120})), &DocumentId::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::PreconditionFailed(_)));
    }

    #[test]
    fn test_advance_merges_and_swaps_active() {
        let (versions, owner, group) = create_versions();
        versions
            .create_initial(&owner, &group, d(json!({"rent": 100})), None)
            .unwrap();

        let doc = DocumentId::new();
        let next = versions
            .advance(&owner, &group, &d(json!({"rent": 120, "term": {"months": 12}})), &doc)
            .unwrap();

        assert_eq!(next.version, 2);
        assert_eq!(next.details, d(json!({"rent": 120, "term": {"months": 12}})));
        assert_eq!(next.source_document_id, Some(doc.clone()));

        let v1 = versions.get_by_version_number(&owner, &group, 1).unwrap().unwrap();
        assert!(!v1.is_active);
        assert_eq!(v1.details, d(json!({"rent": 100})));

        let active = versions.get_active(&owner, &group).unwrap().unwrap();
        assert_eq!(active.version, 2);

        let by_doc = versions.get_by_source_document(&owner, &group, &doc).unwrap().unwrap();
        assert_eq!(by_doc.version, 2);
    }

    #[test]
    fn test_racing_advances_one_conflicts() {
        let (versions, owner, group) = create_versions();
        versions
            .create_initial(&owner, &group, d(json!({"rent": 100})), None)
            .unwrap();

        // Both writers read version 1 as active before either commits.
        let mut first = ChangeSet::new();
        versions
            .stage_advance(&mut first, &owner, &group, &d(json!({"rent": 110})), &DocumentId::new())
            .unwrap();
        let mut second = ChangeSet::new();
        versions
            .stage_advance(&mut second, &owner, &group, &d(json!({"rent": 120})), &DocumentId::new())
            .unwrap();

        versions.store().commit(first).unwrap();
        let err: LedgerError = versions.store().commit(second).unwrap_err().into();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let history = versions.history(&owner, &group).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].details["rent"], DetailValue::Int(110));
    }

    #[test]
    fn test_get_by_version_number_missing() {
        let (versions, owner, group) = create_versions();
        assert!(versions.get_by_version_number(&owner, &group, 3).unwrap().is_none());
    }

    // Correction path: this deliberately rewrites history.
    #[test]
    fn test_amend_version_mutates_history_in_place() {
        let (versions, owner, group) = create_versions();
        versions
            .create_initial(&owner, &group, d(json!({"rent": 100, "term": {"months": 12}})), None)
            .unwrap();
        versions
            .advance(&owner, &group, &d(json!({"rent": 120})), &DocumentId::new())
            .unwrap();

        let amended = versions
            .amend_version(&owner, &group, 1, &d(json!({"term": {"months": 18}})))
            .unwrap();

        assert_eq!(amended.version, 1);
        assert!(!amended.is_active);
        assert_eq!(amended.details, d(json!({"rent": 100, "term": {"months": 18}})));

        // No new version was created and the amendment is visible in history.
        let history = versions.history(&owner, &group).unwrap();
        assert_eq!(history.len(), 2);
        let stored_v1 = versions.get_by_version_number(&owner, &group, 1).unwrap().unwrap();
        assert_eq!(stored_v1.details, amended.details);
        assert!(stored_v1.updated_at >= stored_v1.created_at);

        // The active version is untouched.
        let active = versions.get_active(&owner, &group).unwrap().unwrap();
        assert_eq!(active.version, 2);
        assert_eq!(active.details["term"], DetailValue::Object(d(json!({"months": 12}))));
    }

    #[test]
    fn test_amend_missing_version_is_not_found() {
        let (versions, owner, group) = create_versions();
        let err = versions
            .amend_version(&owner, &group, 4, &d(json!({"rent": 1})))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_resolve_group_checks_owner() {
        let (versions, owner, group) = create_versions();
        assert!(versions.resolve_group(&owner, &group).is_ok());

        let err = versions
            .resolve_group(&OwnerId::from("intruder"), &group)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));

        let err = versions.resolve_group(&owner, &GroupId::new()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_create_group_rejects_blank_name() {
        let (versions, owner, _) = create_versions();
        assert!(matches!(
            versions.create_group(&owner, "   "),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(versions.groups(&owner).unwrap().len(), 1);
    }
}
