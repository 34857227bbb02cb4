//! # Tincan Persist
//!
//! Reactive signals that keep themselves in sync with key-value storage.
//!
//! A persisted cell reads its initial value from a [`Storage`](storage::Storage)
//! backend once, falling back to a default, and then writes its value back as
//! JSON every time it changes:
//!
//! ```
//! use tincan_persist::storage::{MemoryStorage, Storage};
//! use tincan_persist::use_persisted;
//!
//! let storage = MemoryStorage::new();
//! let (theme, set_theme) = use_persisted(storage.clone(), "theme", "light".to_string())?;
//!
//! set_theme.set("dark".to_string());
//! assert_eq!(theme.get(), "dark");
//! assert_eq!(storage.get("theme")?.as_deref(), Some("\"dark\""));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Signals
//!
//! Cells are built on fine-grained reactive primitives, which can also be
//! used on their own:
//! - `Signal<T>` - Reactive values that notify dependents when changed
//! - `Effect` - Side effects that run when dependencies change
//! - `batch` - Coalesce notifications from several changes into one
//!
//! ## Storage
//!
//! - `MemoryStorage` - In-memory map, handy in tests
//! - `FileStorage` - One JSON file on disk
//! - `LocalStorage` - The browser's `window.localStorage` (feature `web`)

pub mod config;
pub mod error;
pub mod persisted;
pub mod runtime;
pub mod signal;
pub mod storage;

// Re-export main types for convenience
pub use config::PersistOptions;
pub use error::{PersistError, StorageError};
pub use persisted::{use_persisted, use_persisted_with, PersistedSignal};
pub use signal::{
    batch, create_effect, create_signal, Effect, ReadSignal, Signal, WatchGuard, WriteSignal,
};
