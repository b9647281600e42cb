//! Leaseline: versioned lease details and CAM-rule aggregation
//!
//! Two subsystems share this crate:
//!
//! - **Version chain**: every uploaded lease document contributes a partial
//!   update (a delta) that is deep-merged onto the group's active snapshot,
//!   producing an append-only chain of numbered versions with exactly one
//!   active. Uploads run as a saga: blob first, then one atomic commit,
//!   with a compensating blob delete on failure.
//! - **Chunk aggregation**: per-page extraction fragments are folded, in
//!   page order, into one cumulative CAM-rule result with deduplicated rules
//!   and a monotone risk level.
//!
//! # Example
//!
//! ```
//! use leaseline::{merge, details_from_json};
//! use serde_json::json;
//!
//! let base = details_from_json(json!({"rent": 100, "term": {"months": 12}})).unwrap();
//! let delta = details_from_json(json!({"term": {"renewal": true}})).unwrap();
//! let merged = merge(&base, &delta);
//! assert_eq!(merged.len(), 2);
//! ```

pub mod aggregate;
pub mod api;
pub mod config;
pub mod details;
pub mod ledger;
pub mod storage;
pub mod upload;

pub use aggregate::{
    AggregateError, AggregateResult, Aggregation, ChunkAggregator, ChunkExtractor,
    DirectoryFragments, ExtractionPipeline, FragmentParseError, FragmentSource, MemoryFragments,
    RiskLevel,
};
pub use api::LeaseApi;
pub use config::Config;
pub use details::{details_from_json, details_from_str, merge, merge_into, DetailValue, Details};
pub use ledger::{
    DocumentId, DocumentKind, DocumentRecord, Group, GroupId, LedgerError, LedgerResult, OwnerId,
    Snapshot, TimelineEntry, VersionStore,
};
pub use storage::{LeaseStore, OpenStore, SqliteStore, StorageError, StorageResult};
pub use upload::{
    DocumentMetadata, LocalObjectStore, MemoryObjectStore, ObjectStore, ObjectStoreError,
    SubmitOutcome, UploadCoordinator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
