use crate::runtime::{ReactiveRuntime, RuntimeInner};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// A reactive signal that holds a value and notifies subscribers when changed.
///
/// Cloning a signal yields another handle to the same value. A signal is
/// bound to the runtime that was current when it was created.
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
    _dependencies: Arc<Mutex<Vec<WatchGuard>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            id: self.id,
            runtime: Arc::clone(&self.runtime),
            _dependencies: Arc::clone(&self._dependencies),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*read(&self.value))
            .finish()
    }
}

fn read<T>(value: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    value.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(value: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    value.write().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(initial: T) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();

        Self {
            value: Arc::new(RwLock::new(initial)),
            id,
            runtime,
            _dependencies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the current value of the signal.
    pub fn get(&self) -> T {
        self.runtime.track_read(self.id);
        read(&self.value).clone()
    }

    /// Set a new value for the signal.
    pub fn set(&self, new_value: T) {
        *write(&self.value) = new_value;
        self.runtime.notify_observers(self.id);
    }

    /// Update the value using a function.
    ///
    /// Observers see the whole updated value, as if it had been passed to
    /// [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = write(&self.value);
        f(&mut *value);
        drop(value); // Release the write lock before notifying
        self.runtime.notify_observers(self.id);
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);
        let value = read(&self.value);
        f(&*value)
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The value cell itself, for watchers that must not keep the signal
    /// alive.
    pub(crate) fn shared_value(&self) -> Arc<RwLock<T>> {
        Arc::clone(&self.value)
    }

    /// Watch this signal for changes.
    ///
    /// The callback is called immediately with the current value, then again
    /// after every change until the returned guard is dropped.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.observe(callback, true)
    }

    /// Like [`watch`](Self::watch), but only called for changes made after
    /// registration.
    pub fn on_change<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.observe(callback, false)
    }

    fn observe<F>(&self, callback: F, immediate: bool) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let observer_id = self.runtime.next_id();
        let value = Arc::clone(&self.value);
        let callback = Arc::new(callback);
        let callback_clone = Arc::clone(&callback);

        // Watchers depend on this signal only, whatever the callback reads
        self.runtime.create_observer(observer_id, move || {
            let val = read(&value).clone();
            ReactiveRuntime::untrack(|| callback_clone(val));
        });
        self.runtime.subscribe(observer_id, self.id);

        if immediate {
            let val = read(&self.value).clone();
            callback(val);
        }

        WatchGuard {
            observer_id,
            runtime: Arc::downgrade(&self.runtime.inner()),
        }
    }

    /// Tie a watcher's lifetime to this signal's value.
    ///
    /// The watcher stays registered until every handle to the signal
    /// (including read and write halves) has been dropped.
    pub fn keep_alive(&self, guard: WatchGuard) {
        self._dependencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(guard);
    }

    /// A read-only handle to this signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            inner: self.clone(),
        }
    }

    /// A write-only handle to this signal.
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal {
            inner: self.clone(),
        }
    }

    /// Split into read and write halves.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (self.read_only(), WriteSignal { inner: self })
    }
}

/// The read half of a signal.
pub struct ReadSignal<T> {
    inner: Signal<T>,
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.inner).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ReadSignal<T> {
    pub fn get(&self) -> T {
        self.inner.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn id(&self) -> usize {
        self.inner.id()
    }

    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.watch(callback)
    }

    pub fn on_change<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.on_change(callback)
    }
}

/// The write half of a signal.
///
/// Writes go through the same notification path as [`Signal::set`], so
/// anything watching the signal sees them.
pub struct WriteSignal<T> {
    inner: Signal<T>,
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.inner).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> WriteSignal<T> {
    pub fn set(&self, new_value: T) {
        self.inner.set(new_value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.update(f);
    }
}

/// Create a new signal and return its read and write halves.
///
/// # Example
///
/// ```
/// use tincan_persist::create_signal;
///
/// let (count, set_count) = create_signal(0);
/// set_count.set(3);
/// assert_eq!(count.get(), 3);
/// ```
pub fn create_signal<T>(initial: T) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + Send + Sync + 'static,
{
    Signal::new(initial).split()
}

/// RAII guard for signal watchers.
pub struct WatchGuard {
    observer_id: usize,
    runtime: Weak<RuntimeInner>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.observer_id);
        }
    }
}
