//! Storage backends for the lease ledger
//!
//! The ledger talks to storage through the `LeaseStore` trait.
//! The primary implementation is `SqliteStore` for persistent storage.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Change, ChangeSet, LeaseStore, OpenStore, StorageError, StorageResult};
