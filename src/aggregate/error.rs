//! Aggregation errors
//!
//! Malformed fragments never appear here: they are skipped and recorded as
//! diagnostics. Apart from `Unreadable`, these errors abort a run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// A fragment arrived at or before an already-folded sequence number
    #[error("fragment {got} arrived after fragment {previous}; fold order must be strictly increasing")]
    OutOfOrder { previous: u64, got: u64 },

    /// A sequence number was offered twice to the reorder buffer
    #[error("fragment {0} was already buffered or released")]
    DuplicateSequence(u64),

    /// One stored fragment could not be read. `run` skips it and continues.
    #[error("fragment {sequence} could not be read: {source}")]
    Unreadable {
        sequence: u64,
        source: std::io::Error,
    },

    /// Listing or purging transient fragment storage failed
    #[error("fragment source I/O error: {0}")]
    Io(#[from] std::io::Error),
}
