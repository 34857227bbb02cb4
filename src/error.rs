//! Error types.

use thiserror::Error;

/// An error raised by a [`Storage`](crate::storage::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached at all, e.g. no `window` or storage
    /// disabled by the browser.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Writing the value would exceed the backend's quota.
    #[error("Quota exceeded writing `{key}`: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The backend's own on-disk index is malformed.
    #[error("Corrupt storage file: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other failure reported by the host environment.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors that can occur when creating or persisting a cell.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Storage key must not be empty")]
    EmptyKey,

    /// The value stored under `key` is not valid JSON for the cell's type.
    #[error("Failed to deserialize value stored under `{key}`: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The cell's value could not be serialized.
    #[error("Failed to serialize value for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
