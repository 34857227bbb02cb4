//! Key-value storage backends.
//!
//! A [`Storage`] is a flat, synchronous map from string keys to string
//! values. Persisted cells store JSON text in it and never interpret keys.

mod file;
mod memory;
#[cfg(feature = "web")]
mod web;

use std::sync::Arc;

pub use file::FileStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "web")]
pub use web::LocalStorage;

use crate::error::StorageError;

/// A synchronous key-value store.
///
/// Implementations must be cheap to call from inside watcher callbacks: every
/// change to a persisted cell ends in one [`set`](Storage::set).
pub trait Storage: Send + Sync {
    /// Retrieves the raw value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}
