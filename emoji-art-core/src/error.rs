//! Error types for emoji art operations.
//!
//! Most user-shaped problems (unknown emoji ids, malformed documents, name
//! collisions) are not errors at all: they surface as `bool` or `Option`.
//! The enums here cover infrastructure failures and programmer errors.

use thiserror::Error;

use crate::document::DocumentId;

/// Result type for store operations.
pub type EmojiArtResult<T> = Result<T, StoreError>;

/// Errors from a [`Storage`](crate::storage::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred while reading or writing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the write (read-only, full, detached...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while resolving a background reference.
///
/// These never reach intent callers: a failed fetch simply leaves the
/// background image absent.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Reading a local file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote request failed.
    #[cfg(feature = "remote")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The reference does not name anything this fetcher can resolve.
    #[error("Unsupported background reference: {0}")]
    InvalidReference(String),

    /// The bytes arrived but could not be decoded into an image.
    #[error("Failed to decode image: {0}")]
    Decode(String),
}

/// Errors that can occur in document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The identity does not name a live document.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
