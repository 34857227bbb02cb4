//! Fine-grained reactive primitives.
//!
//! This module provides the reactive building blocks persisted cells are
//! made of:
//! - Signals: Reactive state containers
//! - Watchers: Callbacks on a single signal's changes
//! - Effects: Side effects that react to changes

mod effect;
mod signal;

pub use effect::{create_effect, Effect};
pub use signal::{create_signal, ReadSignal, Signal, WatchGuard, WriteSignal};

/// Defer change notifications until `f` returns.
///
/// Each watcher or effect notified inside the batch runs once afterwards,
/// seeing the final values.
///
/// ```
/// use tincan_persist::{batch, Signal};
/// use std::sync::{Arc, Mutex};
///
/// let signal = Signal::new(0);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let _guard = signal.on_change(move |v| seen_clone.lock().unwrap().push(v));
///
/// batch(|| {
///     signal.set(1);
///     signal.set(2);
///     signal.set(3);
/// });
///
/// assert_eq!(*seen.lock().unwrap(), vec![3]);
/// ```
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    crate::runtime::ReactiveRuntime::batch(f)
}
