//! Groups, document records, snapshots, and timeline entries

use super::ids::{DocumentId, GroupId, OwnerId};
use crate::details::Details;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The aggregate whose details evolve over successive documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: OwnerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            owner_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// The closed set of accepted document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// The original lease
    Primary,
    /// A later amendment to it
    Amendment,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Amendment => "amendment",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "main lease" => Ok(Self::Primary),
            "amendment" => Ok(Self::Amendment),
            other => Err(format!(
                "unsupported document kind '{}' (expected 'primary' or 'amendment')",
                other
            )),
        }
    }
}

/// A stored source document. The blob itself lives in the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub group_id: GroupId,
    /// Original file name
    pub name: String,
    pub kind: DocumentKind,
    /// Key returned by the object store
    pub blob_key: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// One point-in-time version of a group's details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub owner_id: OwnerId,
    pub group_id: GroupId,
    /// 1-based, contiguous within a group
    pub version: u32,
    pub details: Details,
    /// `None` only for a delta-only first version
    pub source_document_id: Option<DocumentId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A version joined with the metadata of the document that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub version: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub document_id: Option<DocumentId>,
    pub document_kind: Option<DocumentKind>,
    pub document_name: Option<String>,
}
