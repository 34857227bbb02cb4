//! Signals that keep a storage entry in sync with their value.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::PersistOptions;
use crate::error::PersistError;
use crate::signal::{ReadSignal, Signal, WatchGuard, WriteSignal};
use crate::storage::Storage;

/// A reactive value mirrored to one key of a [`Storage`].
///
/// The value is read from storage once, when the cell is created. From then
/// on every change, whether made through the cell, a clone of it, or one of
/// its [`WriteSignal`]s, is serialized to JSON and written back under the
/// same key. Writes stop once every handle to the cell has been dropped.
///
/// Nested data is changed by replacing the value, either wholesale with
/// [`set`](Self::set) or with [`update`](Self::update); the entire new value
/// is written each time.
///
/// ```
/// use tincan_persist::storage::{MemoryStorage, Storage};
/// use tincan_persist::use_persisted;
///
/// let storage = MemoryStorage::new();
/// let (theme, set_theme) = use_persisted(storage.clone(), "theme", "light".to_string()).unwrap();
/// assert_eq!(theme.get(), "light");
///
/// set_theme.set("dark".to_string());
/// assert_eq!(storage.get("theme").unwrap().as_deref(), Some("\"dark\""));
/// ```
pub struct PersistedSignal<T> {
    signal: Signal<T>,
    writer: Arc<Writer<T>>,
}

impl<T> Clone for PersistedSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            writer: Arc::clone(&self.writer),
        }
    }
}

/// Writes a cell's value to its key, one write at a time.
///
/// Each write reads the value only after the previous write has finished, so
/// whichever write runs last stores the newest value, even when changes come
/// from several threads.
struct Writer<T> {
    key: Arc<str>,
    storage: Arc<dyn Storage>,
    value: Arc<RwLock<T>>,
    lock: Mutex<()>,
}

impl<T: Serialize> Writer<T> {
    fn write(&self) -> Result<(), PersistError> {
        let _lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = {
            let value = self.value.read().unwrap_or_else(PoisonError::into_inner);
            serialize(&self.key, &*value)?
        };
        store(self.storage.as_ref(), &self.key, &raw)
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistedSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSignal")
            .field("key", &self.writer.key)
            .field("signal", &self.signal)
            .finish_non_exhaustive()
    }
}

impl<T> PersistedSignal<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a cell for `key`, starting from the stored value or `default`.
    ///
    /// A missing or empty entry selects `default`, which is used as given
    /// without going through JSON.
    ///
    /// # Errors
    ///
    /// - [`PersistError::EmptyKey`] if `key` is empty.
    /// - [`PersistError::Deserialize`] if the stored text is not valid JSON
    ///   for `T`.
    /// - [`PersistError::Storage`] if the backend fails to read, or to write
    ///   the initial value when [`PersistOptions::write_initial`] is set.
    pub fn new<S>(
        storage: S,
        key: impl Into<String>,
        default: T,
        options: PersistOptions,
    ) -> Result<Self, PersistError>
    where
        S: Storage + 'static,
    {
        let key: String = key.into();
        if key.is_empty() {
            return Err(PersistError::EmptyKey);
        }
        let storage: Arc<dyn Storage> = Arc::new(storage);

        let initial = match storage.get(&key)? {
            Some(raw) if !raw.is_empty() => {
                log::debug!("hydrating `{key}` from storage");
                serde_json::from_str(&raw).map_err(|source| PersistError::Deserialize {
                    key: key.clone(),
                    source,
                })?
            }
            _ => {
                log::debug!("nothing stored under `{key}`, using default");
                default
            }
        };

        if options.write_initial {
            store(storage.as_ref(), &key, &serialize(&key, &initial)?)?;
        }

        let signal = Signal::new(initial);
        let writer = Arc::new(Writer {
            key: key.into(),
            storage,
            value: signal.shared_value(),
            lock: Mutex::new(()),
        });
        let guard = signal.on_change({
            let writer = Arc::clone(&writer);
            move |_: T| {
                if let Err(e) = writer.write() {
                    log::error!("{e}");
                }
            }
        });
        signal.keep_alive(guard);

        Ok(Self { signal, writer })
    }

    /// The storage key this cell writes to.
    pub fn key(&self) -> &str {
        &self.writer.key
    }

    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// Replace the value and persist it.
    pub fn set(&self, new_value: T) {
        self.signal.set(new_value);
    }

    /// Change the value in place and persist the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.signal.update(f);
    }

    /// A setter for this cell. Values set through it are persisted.
    pub fn setter(&self) -> WriteSignal<T> {
        self.signal.write_only()
    }

    pub fn read_only(&self) -> ReadSignal<T> {
        self.signal.read_only()
    }

    /// The underlying signal, for use with effects and other signals.
    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }

    /// See [`Signal::watch`].
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.signal.watch(callback)
    }

    /// See [`Signal::on_change`].
    pub fn on_change<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.signal.on_change(callback)
    }

    /// Write the current value to storage now.
    ///
    /// Automatic writes only log their failures; this returns them.
    pub fn persist(&self) -> Result<(), PersistError> {
        self.writer.write()
    }
}

fn serialize<T: Serialize>(key: &str, value: &T) -> Result<String, PersistError> {
    serde_json::to_string(value).map_err(|source| PersistError::Serialize {
        key: key.to_string(),
        source,
    })
}

fn store(storage: &dyn Storage, key: &str, raw: &str) -> Result<(), PersistError> {
    log::trace!("writing {} bytes to `{key}`", raw.len());
    storage.set(key, raw)?;
    Ok(())
}

/// Create a persisted cell for `key` and return it with its setter.
///
/// Shorthand for [`use_persisted_with`] with default options.
///
/// ```
/// use tincan_persist::storage::{MemoryStorage, Storage};
/// use tincan_persist::use_persisted;
///
/// let storage = MemoryStorage::new();
/// storage.set("counter", "5").unwrap();
///
/// let (counter, _set_counter) = use_persisted(storage, "counter", 0).unwrap();
/// assert_eq!(counter.get(), 5);
/// ```
pub fn use_persisted<T, S>(
    storage: S,
    key: impl Into<String>,
    default: T,
) -> Result<(PersistedSignal<T>, WriteSignal<T>), PersistError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: Storage + 'static,
{
    use_persisted_with(storage, key, default, PersistOptions::default())
}

/// Create a persisted cell for `key` with explicit options.
///
/// See [`PersistedSignal::new`] for the errors.
pub fn use_persisted_with<T, S>(
    storage: S,
    key: impl Into<String>,
    default: T,
    options: PersistOptions,
) -> Result<(PersistedSignal<T>, WriteSignal<T>), PersistError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: Storage + 'static,
{
    let cell = PersistedSignal::new(storage, key, default, options)?;
    let setter = cell.setter();
    Ok((cell, setter))
}
