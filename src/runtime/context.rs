use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Dependency graph of a runtime.
struct ReactiveContext {
    // Map from signal ID to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of signal IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to the callback
    observers: HashMap<usize, Observer>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    fn clear(&mut self) {
        self.dependencies.clear();
        self.observer_deps.clear();
        self.observers.clear();
    }

    fn forget_dependencies(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for signal_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&signal_id) {
                    deps.remove(&observer_id);
                    if deps.is_empty() {
                        self.dependencies.remove(&signal_id);
                    }
                }
            }
        }
    }
}

/// Inner runtime state that can be shared.
pub struct RuntimeInner {
    context: Mutex<ReactiveContext>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            context: Mutex::new(ReactiveContext::new()),
        }
    }

    fn context(&self) -> MutexGuard<'_, ReactiveContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unregister an observer and drop all of its dependency edges.
    pub fn remove_observer(&self, observer_id: usize) {
        let mut ctx = self.context();
        ctx.observers.remove(&observer_id);
        ctx.forget_dependencies(observer_id);
    }

    /// Drop the dependency edges of an observer, keeping its callback.
    pub fn forget_dependencies(&self, observer_id: usize) {
        self.context().forget_dependencies(observer_id);
    }

    fn observer_count(&self) -> usize {
        self.context().observers.len()
    }
}

/// Per-thread batching state. Batches never span threads.
#[derive(Default)]
struct Batch {
    depth: usize,
    // (runtime ID, observer ID) pairs already queued in this batch
    queued: HashSet<(usize, usize)>,
    pending: Vec<Box<dyn FnOnce()>>,
}

static NEXT_RUNTIME_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    // Thread-local stack for scoped runtimes
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
    // (runtime ID, observer ID) of the observer currently running on this thread
    static CURRENT_OBSERVER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
    static BATCH: RefCell<Batch> = RefCell::new(Batch::default());
}

fn with_observer_id<F, R>(runtime_id: usize, observer_id: usize, f: F) -> R
where
    F: FnOnce() -> R,
{
    with_current_observer(Some((runtime_id, observer_id)), f)
}

fn with_current_observer<F, R>(observer: Option<(usize, usize)>, f: F) -> R
where
    F: FnOnce() -> R,
{
    let prev = CURRENT_OBSERVER.with(|current| current.replace(observer));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    CURRENT_OBSERVER.with(|current| current.set(prev));

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

/// Hybrid reactive runtime for managing reactive primitives.
///
/// Supports both global runtime (default) and scoped runtimes for isolation.
/// The runtime tracks dependencies between signals, watchers and effects,
/// and dispatches change notifications to them.
///
/// # Examples
///
/// Using the default global runtime:
///
/// ```
/// use tincan_persist::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use tincan_persist::runtime::ReactiveRuntime;
/// use tincan_persist::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// ```
pub struct ReactiveRuntime {
    id: usize,
    next_id: AtomicUsize,
    inner: Arc<RuntimeInner>,
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    ///
    /// This creates a completely independent reactive runtime with its own
    /// dependency graph. Useful for testing or creating isolated contexts.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RuntimeInner::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Signals created inside keep their runtime alive, so a cell can
    /// outlive the closure; everything else is dropped when it returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use tincan_persist::runtime::ReactiveRuntime;
    /// use tincan_persist::Signal;
    ///
    /// ReactiveRuntime::scope(|| {
    ///     let signal = Signal::new(0);
    ///     assert_eq!(signal.get(), 0);
    /// });
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    ///
    /// Returns the runtime from the top of the thread-local stack,
    /// or the global runtime if no scoped runtime is active.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// ```
    /// use tincan_persist::runtime::ReactiveRuntime;
    /// use tincan_persist::Signal;
    ///
    /// let runtime = ReactiveRuntime::new();
    /// ReactiveRuntime::with_runtime(runtime, || {
    ///     let signal = Signal::new(42);
    ///     assert_eq!(signal.get(), 42);
    /// });
    /// ```
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Clear all observers, dependencies, and state from this runtime.
    ///
    /// Useful for resetting between tests. Watchers and effects registered
    /// before the call stop firing, persisted cells included.
    ///
    /// IDs keep counting up: guards of detached watchers may still be
    /// dropped later and must not hit observers registered after the clear.
    pub fn clear(&self) {
        self.inner.context().clear();
    }

    /// Get a reference to the inner runtime state.
    pub(crate) fn inner(&self) -> Arc<RuntimeInner> {
        Arc::clone(&self.inner)
    }

    /// Generate the next unique ID for a reactive primitive.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of live watchers and effects.
    pub fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }

    /// Track a read of a signal by the current observer.
    pub fn track_read(&self, signal_id: usize) {
        let Some((runtime_id, observer_id)) = CURRENT_OBSERVER.with(Cell::get) else {
            return;
        };
        if runtime_id != self.id {
            return;
        }

        let mut ctx = self.inner.context();
        ctx.dependencies
            .entry(signal_id)
            .or_default()
            .insert(observer_id);
        ctx.observer_deps
            .entry(observer_id)
            .or_default()
            .insert(signal_id);
    }

    /// Subscribe an observer to a signal without running anything.
    pub fn subscribe(&self, observer_id: usize, signal_id: usize) {
        with_observer_id(self.id, observer_id, || self.track_read(signal_id));
    }

    /// Notify all observers that depend on a signal.
    ///
    /// Inside a [`batch`](Self::batch) the observers are queued and run once
    /// when the outermost batch ends.
    pub fn notify_observers(&self, signal_id: usize) {
        let observers: Vec<(usize, Observer)> = {
            let ctx = self.inner.context();
            let Some(ids) = ctx.dependencies.get(&signal_id) else {
                return;
            };
            let mut ids: Vec<usize> = ids.iter().copied().collect();
            // Registration order
            ids.sort_unstable();
            ids.into_iter()
                .filter_map(|id| ctx.observers.get(&id).map(|f| (id, Arc::clone(f))))
                .collect()
        };

        for (observer_id, observer) in observers {
            let runtime_id = self.id;
            let queued = BATCH.with(|batch| {
                let mut batch = batch.borrow_mut();
                if batch.depth == 0 {
                    return false;
                }
                if batch.queued.insert((runtime_id, observer_id)) {
                    let observer = Arc::clone(&observer);
                    batch.pending.push(Box::new(move || {
                        with_observer_id(runtime_id, observer_id, || observer());
                    }));
                }
                true
            });

            if !queued {
                log::trace!("running observer {observer_id} for signal {signal_id}");
                with_observer_id(runtime_id, observer_id, || observer());
            }
        }
    }

    /// Register (or replace) the callback of an observer.
    ///
    /// Any dependencies previously recorded for `observer_id` are dropped.
    pub fn create_observer<F>(&self, observer_id: usize, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut ctx = self.inner.context();
        ctx.forget_dependencies(observer_id);
        ctx.observers.insert(observer_id, Arc::new(f));
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_observer_id(self.id, observer_id, f)
    }

    /// Run `f` without recording the reads it makes.
    pub fn untrack<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_current_observer(None, f)
    }

    /// Run `f` with change notifications deferred.
    ///
    /// Every observer notified during `f` runs exactly once after the
    /// outermost batch on this thread returns, seeing the values as they are
    /// at that point.
    pub fn batch<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        let pending = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth -= 1;
            if batch.depth == 0 {
                batch.queued.clear();
                std::mem::take(&mut batch.pending)
            } else {
                Vec::new()
            }
        });

        // Changes made before a panic still reach their observers
        if !pending.is_empty() {
            log::trace!("flushing {} batched observers", pending.len());
        }
        for observer in pending {
            observer();
        }

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_runtime_is_current() {
        let outer = ReactiveRuntime::current();
        ReactiveRuntime::scope(|| {
            let inner = ReactiveRuntime::current();
            assert!(!Arc::ptr_eq(&outer, &inner));
        });
        assert!(Arc::ptr_eq(&outer, &ReactiveRuntime::current()));
    }

    #[test]
    fn notify_runs_subscribed_observer() {
        let runtime = ReactiveRuntime::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let signal_id = runtime.next_id();
        let observer_id = runtime.next_id();
        runtime.create_observer(observer_id, move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        runtime.subscribe(observer_id, signal_id);

        runtime.notify_observers(signal_id);
        runtime.notify_observers(signal_id);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        runtime.inner().remove_observer(observer_id);
        runtime.notify_observers(signal_id);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.observer_count(), 0);
    }

    #[test]
    fn batch_runs_each_observer_once() {
        let runtime = ReactiveRuntime::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let signal_id = runtime.next_id();
        let observer_id = runtime.next_id();
        runtime.create_observer(observer_id, move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        runtime.subscribe(observer_id, signal_id);

        ReactiveRuntime::batch(|| {
            runtime.notify_observers(signal_id);
            ReactiveRuntime::batch(|| runtime.notify_observers(signal_id));
            runtime.notify_observers(signal_id);
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reads_are_not_tracked_across_runtimes() {
        let a = ReactiveRuntime::new();
        let b = ReactiveRuntime::new();
        let observer_id = a.next_id();
        a.create_observer(observer_id, || {});

        a.with_observer(observer_id, || b.track_read(7));
        assert!(b.inner.context().dependencies.is_empty());
    }

    #[test]
    fn clear_drops_observers_but_not_ids() {
        let runtime = ReactiveRuntime::new();
        let id = runtime.next_id();
        runtime.create_observer(id, || {});
        runtime.clear();
        assert_eq!(runtime.observer_count(), 0);
        assert_ne!(runtime.next_id(), id);
    }

    #[test]
    fn batch_flushes_changes_made_before_a_panic() {
        let runtime = ReactiveRuntime::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let signal_id = runtime.next_id();
        let observer_id = runtime.next_id();
        runtime.create_observer(observer_id, move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        runtime.subscribe(observer_id, signal_id);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ReactiveRuntime::batch(|| {
                runtime.notify_observers(signal_id);
                panic!("interrupted batch");
            })
        }));

        assert!(result.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The batch is closed again
        runtime.notify_observers(signal_id);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
