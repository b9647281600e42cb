//! Document upload: object storage and the upload-then-commit saga

mod coordinator;
mod local;
mod memory;
mod object_store;

pub use coordinator::{DocumentMetadata, SubmitOutcome, UploadCoordinator};
pub use local::LocalObjectStore;
pub use memory::{MemoryObjectStore, StoredBlob};
pub use object_store::{blob_key, validate_key, ObjectStore, ObjectStoreError};
