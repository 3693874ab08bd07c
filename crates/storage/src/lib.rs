//! Artifact storage.
//!
//! Completed generations are persisted as objects under stable keys;
//! the job record only ever carries the key (`result_ref`), never the
//! bytes. [`ObjectStore`] is the seam; [`S3ObjectStore`] is the
//! production implementation, [`MemoryObjectStore`] backs tests.

pub mod memory;
pub mod s3;

use async_trait::async_trait;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, StorageConfig};

/// Errors from the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The upload or download failed at the storage backend.
    #[error("storage backend error for key '{key}': {message}")]
    Backend { key: String, message: String },

    /// The requested key does not exist.
    #[error("no object stored under key '{0}'")]
    NotFound(String),
}

/// A stored object, as returned by [`ObjectStore::get`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Write-once artifact storage keyed by string paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any previous object.
    /// Returns the key as the durable reference to record on the job.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Retrieve the object stored under `key`.
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;
}
