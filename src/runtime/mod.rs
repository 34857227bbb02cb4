//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking,
//! change notification, batching and execution contexts.

mod context;

pub use context::ReactiveRuntime;
pub(crate) use context::RuntimeInner;
