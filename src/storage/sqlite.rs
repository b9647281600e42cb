//! SQLite storage backend for the lease ledger

use super::traits::{Change, ChangeSet, LeaseStore, OpenStore, StorageError, StorageResult};
use crate::details::Details;
use crate::ledger::{
    DocumentId, DocumentKind, DocumentRecord, Group, GroupId, OwnerId, Snapshot, TimelineEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::Mutex;

const SNAPSHOT_COLUMNS: &str = "owner_id, group_id, version, details_json, source_document_id, \
                                is_active, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, owner_id, group_id, name, kind, blob_key, content_type, created_at";

type SnapshotRow = (String, String, u32, String, Option<String>, bool, String, String);

type DocumentRow = (String, String, String, String, String, String, String, String);

/// SQLite-backed lease store
///
/// Uses a single SQLite database file with tables for groups, documents,
/// and snapshots. Thread-safe via internal mutex on the connection; every
/// `ChangeSet` is applied inside one SQLite transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Groups table
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_groups_owner
                ON groups(owner_id);

            -- Documents table (blob bytes live in the object store)
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                blob_key TEXT NOT NULL,
                content_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_documents_group
                ON documents(owner_id, group_id);

            -- Snapshots table: one row per version
            CREATE TABLE IF NOT EXISTS snapshots (
                owner_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                details_json TEXT NOT NULL,
                source_document_id TEXT,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, group_id, version),
                UNIQUE (owner_id, group_id, source_document_id)
            );

            -- At most one active snapshot per chain
            CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshots_one_active
                ON snapshots(owner_id, group_id) WHERE is_active = 1;

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    fn parse_time(value: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn parse_kind(value: String) -> StorageResult<DocumentKind> {
        Ok(serde_json::from_value(serde_json::Value::String(value))?)
    }

    /// Map unique/foreign-key violations to `Conflict`, keep everything else.
    fn conflict_or_database(err: rusqlite::Error, what: impl FnOnce() -> String) -> StorageError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Conflict(what())
            }
            _ => StorageError::Database(err),
        }
    }

    fn read_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn row_to_snapshot(row: SnapshotRow) -> StorageResult<Snapshot> {
        let (owner_id, group_id, version, details_json, source, is_active, created, updated) = row;
        Ok(Snapshot {
            owner_id: OwnerId::from_string(owner_id),
            group_id: GroupId::from_string(group_id),
            version,
            details: serde_json::from_str(&details_json)?,
            source_document_id: source.map(DocumentId::from_string),
            is_active,
            created_at: Self::parse_time(&created)?,
            updated_at: Self::parse_time(&updated)?,
        })
    }

    fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn row_to_document(row: DocumentRow) -> StorageResult<DocumentRecord> {
        let (id, owner_id, group_id, name, kind, blob_key, content_type, created) = row;
        Ok(DocumentRecord {
            id: DocumentId::from_string(id),
            owner_id: OwnerId::from_string(owner_id),
            group_id: GroupId::from_string(group_id),
            name,
            kind: Self::parse_kind(kind)?,
            blob_key,
            content_type,
            created_at: Self::parse_time(&created)?,
        })
    }

    fn query_one_snapshot(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Option<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM snapshots WHERE {}", SNAPSHOT_COLUMNS, filter);
        let row = conn
            .query_row(&sql, params, Self::read_snapshot_row)
            .optional()?;
        row.map(Self::row_to_snapshot).transpose()
    }

    fn apply_change(tx: &Transaction<'_>, change: Change) -> StorageResult<()> {
        match change {
            Change::InsertDocument(doc) => {
                tx.execute(
                    &format!(
                        "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        DOCUMENT_COLUMNS
                    ),
                    params![
                        doc.id.as_str(),
                        doc.owner_id.as_str(),
                        doc.group_id.as_str(),
                        doc.name,
                        doc.kind.as_str(),
                        doc.blob_key,
                        doc.content_type,
                        doc.created_at.to_rfc3339(),
                    ],
                )
                .map_err(|e| {
                    Self::conflict_or_database(e, || format!("document {} could not be recorded", doc.id))
                })?;
            }
            Change::Deactivate {
                owner_id,
                group_id,
                version,
            } => {
                let rows = tx.execute(
                    r#"
                    UPDATE snapshots SET is_active = 0, updated_at = ?4
                    WHERE owner_id = ?1 AND group_id = ?2 AND version = ?3 AND is_active = 1
                    "#,
                    params![
                        owner_id.as_str(),
                        group_id.as_str(),
                        version,
                        Utc::now().to_rfc3339()
                    ],
                )?;
                if rows == 0 {
                    return Err(StorageError::Conflict(format!(
                        "version {} of group {} is no longer active",
                        version, group_id
                    )));
                }
            }
            Change::InsertSnapshot(snapshot) => {
                tx.execute(
                    &format!(
                        "INSERT INTO snapshots ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        SNAPSHOT_COLUMNS
                    ),
                    params![
                        snapshot.owner_id.as_str(),
                        snapshot.group_id.as_str(),
                        snapshot.version,
                        serde_json::to_string(&snapshot.details)?,
                        snapshot.source_document_id.as_ref().map(|d| d.as_str()),
                        snapshot.is_active,
                        snapshot.created_at.to_rfc3339(),
                        snapshot.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(|e| {
                    Self::conflict_or_database(e, || {
                        format!(
                            "version {} of group {} already exists or another version is active",
                            snapshot.version, snapshot.group_id
                        )
                    })
                })?;
            }
        }
        Ok(())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LeaseStore for SqliteStore {
    // === Group Operations ===

    fn save_group(&self, group: &Group) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO groups (id, owner_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name
            "#,
            params![
                group.id.as_str(),
                group.owner_id.as_str(),
                group.name,
                group.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_group(&self, id: &GroupId) -> StorageResult<Option<Group>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT owner_id, name, created_at FROM groups WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((owner_id, name, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Group {
            id: id.clone(),
            owner_id: OwnerId::from_string(owner_id),
            name,
            created_at: Self::parse_time(&created_at)?,
        }))
    }

    fn list_groups(&self, owner: &OwnerId) -> StorageResult<Vec<Group>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM groups WHERE owner_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![owner.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut groups = Vec::new();
        for row in rows {
            let (id, name, created_at) = row?;
            groups.push(Group {
                id: GroupId::from_string(id),
                owner_id: owner.clone(),
                name,
                created_at: Self::parse_time(&created_at)?,
            });
        }
        Ok(groups)
    }

    // === Document Operations ===

    fn load_document(&self, id: &DocumentId) -> StorageResult<Option<DocumentRecord>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id.as_str()],
                Self::read_document_row,
            )
            .optional()?;
        row.map(Self::row_to_document).transpose()
    }

    fn list_documents(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<DocumentRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE owner_id = ?1 AND group_id = ?2 ORDER BY created_at, rowid",
            DOCUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner.as_str(), group.as_str()], Self::read_document_row)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(Self::row_to_document(row?)?);
        }
        Ok(documents)
    }

    // === Snapshot Operations ===

    fn active_snapshot(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Option<Snapshot>> {
        self.query_one_snapshot(
            "owner_id = ?1 AND group_id = ?2 AND is_active = 1",
            &[&owner.as_str(), &group.as_str()],
        )
    }

    fn snapshot_by_version(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
    ) -> StorageResult<Option<Snapshot>> {
        self.query_one_snapshot(
            "owner_id = ?1 AND group_id = ?2 AND version = ?3",
            &[&owner.as_str(), &group.as_str(), &version],
        )
    }

    fn snapshot_by_document(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        document: &DocumentId,
    ) -> StorageResult<Option<Snapshot>> {
        self.query_one_snapshot(
            "owner_id = ?1 AND group_id = ?2 AND source_document_id = ?3",
            &[&owner.as_str(), &group.as_str(), &document.as_str()],
        )
    }

    fn latest_version(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Option<u32>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<u32> = conn.query_row(
            "SELECT MAX(version) FROM snapshots WHERE owner_id = ?1 AND group_id = ?2",
            params![owner.as_str(), group.as_str()],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn list_snapshots(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM snapshots WHERE owner_id = ?1 AND group_id = ?2 ORDER BY version DESC",
            SNAPSHOT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner.as_str(), group.as_str()], Self::read_snapshot_row)?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(Self::row_to_snapshot(row?)?);
        }
        Ok(snapshots)
    }

    fn timeline(&self, owner: &OwnerId, group: &GroupId) -> StorageResult<Vec<TimelineEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT s.version, s.is_active, s.created_at, s.source_document_id, d.kind, d.name
            FROM snapshots s
            LEFT JOIN documents d ON d.id = s.source_document_id
            WHERE s.owner_id = ?1 AND s.group_id = ?2
            ORDER BY s.version DESC
            "#,
        )?;
        let rows = stmt.query_map(params![owner.as_str(), group.as_str()], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (version, is_active, created_at, document_id, kind, name) = row?;
            entries.push(TimelineEntry {
                version,
                is_active,
                created_at: Self::parse_time(&created_at)?,
                document_id: document_id.map(DocumentId::from_string),
                document_kind: kind.map(Self::parse_kind).transpose()?,
                document_name: name,
            });
        }
        Ok(entries)
    }

    fn replace_details(
        &self,
        owner: &OwnerId,
        group: &GroupId,
        version: u32,
        details: &Details,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"
            UPDATE snapshots SET details_json = ?4, updated_at = ?5
            WHERE owner_id = ?1 AND group_id = ?2 AND version = ?3
            "#,
            params![
                owner.as_str(),
                group.as_str(),
                version,
                serde_json::to_string(details)?,
                updated_at.to_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }

    // === Transactions ===

    fn commit(&self, changes: ChangeSet) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for change in changes.into_changes() {
            // Dropping `tx` on error rolls every earlier change back.
            Self::apply_change(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }
}
