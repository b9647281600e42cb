//! Errors surfaced by version-chain and upload operations

use crate::storage::StorageError;
use crate::upload::ObjectStoreError;
use thiserror::Error;

/// Errors that can occur in ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed delta, disallowed document kind, or missing file
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The group exists but belongs to another owner
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A concurrent submission advanced the chain first; the caller may retry
    #[error("conflict: {0}")]
    Conflict(String),

    /// The chain is not in the state the operation requires
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("object store error: {0}")]
    Blob(#[from] ObjectStoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Storage(other),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
