//! Lease ledger: groups, source documents, and versioned detail snapshots

mod error;
mod ids;
mod records;
mod versions;

pub use error::{LedgerError, LedgerResult};
pub use ids::{DocumentId, GroupId, OwnerId};
pub use records::{DocumentKind, DocumentRecord, Group, Snapshot, TimelineEntry};
pub use versions::VersionStore;
