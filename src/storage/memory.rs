use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Storage;
use crate::error::StorageError;

#[derive(Default)]
struct Entries {
    map: HashMap<String, String>,
    quota: Option<usize>,
}

impl Entries {
    fn used_without(&self, key: &str) -> usize {
        self.map
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

/// In-memory storage.
///
/// Clones share the same entries, so a test can hand one clone to a cell and
/// inspect the other.
///
/// ```
/// use tincan_persist::storage::{MemoryStorage, Storage};
///
/// let storage = MemoryStorage::new();
/// storage.set("theme", "\"dark\"").unwrap();
/// assert_eq!(storage.get("theme").unwrap().as_deref(), Some("\"dark\""));
/// ```
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys and values together would take
    /// more than `bytes` bytes.
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::new();
        storage.entries().quota = Some(bytes);
        storage
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().map.is_empty()
    }

    pub fn clear(&self) {
        self.entries().map.clear();
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries();
        if let Some(quota) = entries.quota {
            let used = entries.used_without(key);
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        entries.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().map.remove(key);
        Ok(())
    }
}
