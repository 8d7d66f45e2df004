//! Blob storage for mixed arrangements.
//!
//! [`BlobStore`] is the seam the pipeline writes through and the API reads
//! through. Two backends: [`S3BlobStore`] for S3-compatible object storage
//! and [`LocalBlobStore`] for a directory on disk.

use async_trait::async_trait;

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Invalid blob name: {0:?}")]
    InvalidName(String),
}

/// Opaque named byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any existing blob.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch the blob stored under `name`, or `None` if there is none.
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove the blob under `name`. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;
}

/// A fresh opaque blob name: a v4 UUID as 32 hex digits.
pub fn new_blob_name() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Reject names that could escape the store's namespace.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let ok = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
