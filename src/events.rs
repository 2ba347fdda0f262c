//! Error broadcast channel.
//!
//! Write failures are delivered here so they are never silently lost, even
//! when callers ignore the handle a write returns. The channel is an explicit
//! object passed by reference (typically one per application, constructed at
//! startup and shared via `Arc`) rather than a module-level singleton, so
//! tests can build a fresh channel each.
//!
//! Delivery is synchronous, in registration order, at-most-once: there is no
//! buffering or replay, and an observer registered after an emit never sees
//! that event.

use crate::types::ErrorEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

struct Inner {
    /// Registered observers in registration order.
    observers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Broadcast point for write failures.
#[derive(Clone)]
pub struct ErrorChannel {
    inner: Arc<Inner>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register an observer. It receives every event emitted while the
    /// returned guard is alive; dropping the guard unregisters it.
    pub fn observe(&self, handler: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> ObserverGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.observers.lock().push((id, Arc::new(handler)));
        ObserverGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an event to all currently-registered observers, in
    /// registration order.
    ///
    /// The observer list is snapshotted before delivery, so a handler may
    /// observe or unobserve without corrupting the current emit; an observer
    /// registered mid-emit does not receive the current event.
    pub fn emit(&self, event: ErrorEvent) {
        let handlers: Vec<Handler> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one observer registered; unregisters on drop.
pub struct ObserverGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl ObserverGuard {
    /// Unregister explicitly (same as dropping the guard).
    pub fn unobserve(self) {}
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
