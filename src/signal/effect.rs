use crate::runtime::{ReactiveRuntime, RuntimeInner};
use std::sync::{Arc, Weak};

/// A side effect that runs when its dependencies change.
///
/// Effects automatically track signal reads and re-run when those signals change.
/// The effect runs immediately on creation to establish initial dependencies,
/// and stops when dropped.
///
/// # Examples
///
/// ```
/// use tincan_persist::{Effect, Signal};
/// use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
///
/// let signal = Signal::new(5);
/// let last_value = Arc::new(AtomicI32::new(0));
/// let last_value_clone = last_value.clone();
///
/// let _effect = Effect::new({
///     let signal = signal.clone();
///     move || {
///         last_value_clone.store(signal.get(), Ordering::SeqCst);
///     }
/// });
///
/// assert_eq!(last_value.load(Ordering::SeqCst), 5);
///
/// signal.set(10);
/// assert_eq!(last_value.load(Ordering::SeqCst), 10);
/// ```
pub struct Effect {
    id: usize,
    run: Arc<dyn Fn() + Send + Sync>,
    runtime: Weak<RuntimeInner>,
}

impl Effect {
    /// Create a new effect in the current runtime.
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let effect: Arc<dyn Fn() + Send + Sync> = Arc::new(effect);
        let effect_clone = Arc::clone(&effect);

        // Register the effect with the runtime. Each run records its reads
        // afresh, so branches not taken stop triggering it.
        let inner = Arc::downgrade(&runtime.inner());
        runtime.create_observer(id, move || {
            if let Some(inner) = inner.upgrade() {
                inner.forget_dependencies(id);
            }
            effect_clone();
        });

        // Run immediately within the observer context to track dependencies
        runtime.with_observer(id, || {
            effect();
        });

        Self {
            id,
            run: effect,
            runtime: Arc::downgrade(&runtime.inner()),
        }
    }

    /// Manually trigger the effect. Reads are not tracked.
    pub fn run(&self) {
        (self.run)();
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
    }
}

/// Create a new effect that runs when dependencies change.
///
/// The effect runs immediately and then again whenever any signal
/// it reads changes. Keep the returned [`Effect`] alive for as long as it
/// should keep running.
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
