//! A provider-agnostic service for binary object storage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait::async_trait]
pub trait StorageService: Send + Sync {
    /// Stores `data` under `path` and returns a publicly resolvable URL.
    async fn upload_file(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;
}
