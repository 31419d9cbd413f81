//! Push-based reactive primitives the form graph is built on.
//!
//! A [`Store`] owns a value and recomputes its derived stores synchronously on
//! every change. An [`Event`] carries a payload to its handlers. Every write and
//! every emission runs inside a [`batch`]: graph wiring runs immediately, while
//! watchers registered through `watch`/`subscribe` are deferred until the
//! outermost batch returns, so a watcher never sees a half-updated graph.

mod batch;
mod event;
mod store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use batch::batch;
pub(crate) use batch::defer;
pub use event::Event;
pub use store::{Store, StoreValue};

static NODE_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NODE_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) struct WatcherId(u64);

impl WatcherId {
    pub(crate) fn next() -> Self {
        Self(NODE_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// Handle returned by `watch`/`subscribe`.
///
/// Dropping it leaves the watcher attached; call [`Subscription::unsubscribe`]
/// to detach.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub(crate) type Notify = Arc<dyn Fn() + Send + Sync>;

// Reactive nodes never hold a lock across user callbacks, so a poisoned lock
// only means a callback panicked after the value was written.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
