//! Subscription manager: live channels onto documents and queries.

use crate::backend::{ListenerId, SnapshotEvent, SnapshotSink, StoreBackend};
use crate::error::{Result, SyncError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::types::{
    DataCallback, ErrorCallback, SnapshotData, SubscriptionId, SubscriptionState,
    SubscriptionTarget,
};

/// Per-subscription state shared with the backend sink closures.
struct Shared {
    id: SubscriptionId,
    /// Checked before every callback invocation; set on unsubscribe or error.
    closed: AtomicBool,
    /// Bumped on every retarget; a sink from an older epoch delivers nothing.
    epoch: AtomicU64,
    state: Mutex<SubscriptionState>,
    /// Back-reference for releasing the slot when the sink closes itself.
    registry: Weak<Registry>,
    on_data: DataCallback,
    on_error: ErrorCallback,
}

impl Shared {
    /// Deliver one backend event, if this sink's epoch is still current and
    /// the subscription has not closed.
    fn deliver(&self, epoch: u64, event: SnapshotEvent) {
        if self.closed.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        match event {
            SnapshotEvent::Document(snapshot) => {
                *self.state.lock() = SubscriptionState::Streaming;
                (self.on_data)(SnapshotData::Document(snapshot));
            }
            SnapshotEvent::Query(records) => {
                *self.state.lock() = SubscriptionState::Streaming;
                (self.on_data)(SnapshotData::Query(records));
            }
            SnapshotEvent::Error(err) => {
                // Forwarded verbatim, at most once; Closed is terminal, so
                // the store-level listener is released as well.
                if !self.closed.swap(true, Ordering::SeqCst) {
                    *self.state.lock() = SubscriptionState::Closed;
                    if let Some(registry) = self.registry.upgrade() {
                        registry.release(self.id);
                    }
                    debug!(subscription = self.id.0, error = %err, "subscription closed on store error");
                    (self.on_error)(err);
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock() = SubscriptionState::Closed;
    }
}

/// Internal slot: one logical subscription bound to one store listener.
struct Slot {
    target: SubscriptionTarget,
    listener: ListenerId,
    shared: Arc<Shared>,
}

/// Slot registry plus the backend the slots listen on. Shared between the
/// manager, the handles, and the sink closures so each of them can release
/// a subscription's store listener.
struct Registry {
    backend: Arc<dyn StoreBackend>,
    slots: RwLock<HashMap<SubscriptionId, Slot>>,
}

impl Registry {
    /// Remove a slot and tear down its store listener. Idempotent.
    fn release(&self, id: SubscriptionId) {
        let slot = self.slots.write().remove(&id);
        if let Some(slot) = slot {
            self.backend.unlisten(slot.listener);
        }
    }
}

/// Handle to manage a subscription.
///
/// Dropping the handle unsubscribes; [`SubscriptionManager::unsubscribe`]
/// does the same by id, and the two are idempotent with each other.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the subscription. Idempotent; same effect as dropping.
    pub fn unsubscribe(&self) {
        self.shared.close();
        if let Some(registry) = self.shared.registry.upgrade() {
            registry.release(self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Manages live subscriptions over a store backend.
///
/// Each subscription owns at most one store-level listener; retargeting
/// closes the old listener before opening the new one, so overlapping
/// listeners on two targets never coexist for the same slot. `Closed` is
/// terminal: unsubscribing, a store-level error, and dropping the handle all
/// release the slot and its store listener.
pub struct SubscriptionManager {
    registry: Arc<Registry>,
    /// Counter for generating subscription ids.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            registry: Arc::new(Registry {
                backend,
                slots: RwLock::new(HashMap::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a live subscription.
    ///
    /// `on_data` receives every snapshot until the subscription closes;
    /// `on_error` receives at most one store-level error, after which no
    /// further callbacks are invoked. Attach failures are reported through
    /// `on_error` as well.
    pub fn subscribe(
        &self,
        target: impl Into<SubscriptionTarget>,
        on_data: impl Fn(SnapshotData) + Send + Sync + 'static,
        on_error: impl Fn(SyncError) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let target = target.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let shared = Arc::new(Shared {
            id,
            closed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            state: Mutex::new(SubscriptionState::Idle),
            registry: Arc::downgrade(&self.registry),
            on_data: Arc::new(on_data),
            on_error: Arc::new(on_error),
        });

        debug!(subscription = id.0, target = ?target, "subscribing");
        match self.attach(&shared, &target) {
            // The initial snapshot may close the subscription before attach
            // returns (store-level error during delivery); the listener must
            // not be parked in the registry in that case.
            Ok(listener) if shared.closed.load(Ordering::SeqCst) => {
                self.registry.backend.unlisten(listener);
            }
            Ok(listener) => {
                self.registry.slots.write().insert(
                    id,
                    Slot {
                        target,
                        listener,
                        shared: shared.clone(),
                    },
                );
            }
            Err(err) => {
                shared.close();
                (shared.on_error)(err);
            }
        }

        SubscriptionHandle { id, shared }
    }

    /// Close a subscription. Idempotent; after this returns, callbacks whose
    /// delivery had not yet started are suppressed by the closed flag.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let shared = self
            .registry
            .slots
            .read()
            .get(&id)
            .map(|slot| slot.shared.clone());
        if let Some(shared) = shared {
            shared.close();
            self.registry.release(id);
            debug!(subscription = id.0, "unsubscribed");
        }
    }

    /// Rebind a subscription to a new target.
    ///
    /// A structurally equal target is a no-op. Otherwise the old listener is
    /// closed before the new one opens, and any late emission from the old
    /// target is discarded by the epoch guard. Fails if the subscription is
    /// unknown or already closed.
    pub fn retarget(&self, id: SubscriptionId, target: impl Into<SubscriptionTarget>) -> Result<()> {
        let target = target.into();

        // Invalidate the old sink via the epoch before touching the backend.
        // The slot lock is not held across attach: backends deliver the
        // initial snapshot from inside listen, and that callback may re-enter
        // the manager.
        let (shared, old_listener) = {
            let mut slots = self.registry.slots.write();
            let slot = slots
                .get_mut(&id)
                .filter(|s| !s.shared.closed.load(Ordering::SeqCst))
                .ok_or_else(|| {
                    SyncError::InvalidArguments(format!("subscription {} is closed", id.0))
                })?;

            if slot.target == target {
                return Ok(());
            }
            slot.shared.epoch.fetch_add(1, Ordering::SeqCst);
            (slot.shared.clone(), slot.listener)
        };

        self.registry.backend.unlisten(old_listener);
        debug!(subscription = id.0, target = ?target, "retargeting");

        match self.attach(&shared, &target) {
            Ok(listener) if shared.closed.load(Ordering::SeqCst) => {
                // Closed during the initial delivery (store error) or by a
                // concurrent unsubscribe; the slot is already released.
                self.registry.backend.unlisten(listener);
                self.registry.release(id);
                Ok(())
            }
            Ok(listener) => {
                let mut slots = self.registry.slots.write();
                match slots.get_mut(&id) {
                    Some(slot) => {
                        slot.listener = listener;
                        slot.target = target;
                    }
                    // Unsubscribed while attaching.
                    None => self.registry.backend.unlisten(listener),
                }
                Ok(())
            }
            Err(err) => {
                self.registry.release(id);
                shared.close();
                (shared.on_error)(err);
                Ok(())
            }
        }
    }

    /// Current state of a subscription. Unknown ids report `Closed`.
    pub fn state(&self, id: SubscriptionId) -> SubscriptionState {
        self.registry
            .slots
            .read()
            .get(&id)
            .map(|slot| *slot.shared.state.lock())
            .unwrap_or(SubscriptionState::Closed)
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.slots.read().len()
    }

    /// Register a store listener for `target`, feeding `shared` at its
    /// current epoch.
    fn attach(&self, shared: &Arc<Shared>, target: &SubscriptionTarget) -> Result<ListenerId> {
        *shared.state.lock() = SubscriptionState::Attaching;
        let epoch = shared.epoch.load(Ordering::SeqCst);
        let sink_shared = shared.clone();
        let sink: SnapshotSink = Arc::new(move |event| sink_shared.deliver(epoch, event));
        match target {
            SubscriptionTarget::Document(doc) => self.registry.backend.listen_document(doc, sink),
            SubscriptionTarget::Query(query) => self.registry.backend.listen_query(query, sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryDescriptor;
    use crate::refs::{CollectionRef, DocumentRef};
    use crate::types::SnapshotRecord;
    use parking_lot::Mutex as PlMutex;

    /// Scriptable backend: captures sinks so tests can push events at will.
    #[derive(Default)]
    struct FakeBackend {
        sinks: PlMutex<HashMap<u64, SnapshotSink>>,
        next: AtomicU64,
        listens: AtomicU64,
        unlistens: AtomicU64,
    }

    impl FakeBackend {
        fn push(&self, listener: ListenerId, event: SnapshotEvent) {
            let sink = self.sinks.lock().get(&listener.0).cloned();
            if let Some(sink) = sink {
                sink(event);
            }
        }

        fn last_listener(&self) -> ListenerId {
            ListenerId(self.next.load(Ordering::SeqCst))
        }

        fn register(&self, sink: SnapshotSink) -> ListenerId {
            let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            self.listens.fetch_add(1, Ordering::SeqCst);
            self.sinks.lock().insert(id, sink);
            ListenerId(id)
        }
    }

    impl StoreBackend for FakeBackend {
        fn listen_document(&self, _doc: &DocumentRef, sink: SnapshotSink) -> Result<ListenerId> {
            Ok(self.register(sink))
        }

        fn listen_query(&self, _query: &QueryDescriptor, sink: SnapshotSink) -> Result<ListenerId> {
            Ok(self.register(sink))
        }

        fn unlisten(&self, id: ListenerId) {
            self.unlistens.fetch_add(1, Ordering::SeqCst);
            self.sinks.lock().remove(&id.0);
        }

        fn create(&self, _c: &CollectionRef, _f: crate::types::Fields) -> Result<DocumentRef> {
            unimplemented!("fake backend is read-only")
        }

        fn set(
            &self,
            _d: &DocumentRef,
            _f: crate::types::Fields,
            _m: crate::types::MergeOption,
        ) -> Result<()> {
            unimplemented!("fake backend is read-only")
        }

        fn update(&self, _d: &DocumentRef, _f: crate::types::Fields) -> Result<()> {
            unimplemented!("fake backend is read-only")
        }

        fn delete(&self, _d: &DocumentRef) -> Result<()> {
            unimplemented!("fake backend is read-only")
        }
    }

    fn doc_snapshot(id: &str) -> SnapshotEvent {
        SnapshotEvent::Document(Some(SnapshotRecord::new(id, Default::default())))
    }

    fn setup() -> (Arc<FakeBackend>, SubscriptionManager) {
        let backend = Arc::new(FakeBackend::default());
        let manager = SubscriptionManager::new(backend.clone());
        (backend, manager)
    }

    #[test]
    fn test_state_machine_attaching_to_streaming() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc, |_| {}, |_| {});
        assert_eq!(handle.state(), SubscriptionState::Attaching);

        backend.push(backend.last_listener(), SnapshotEvent::Document(None));
        assert_eq!(handle.state(), SubscriptionState::Streaming);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (_backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc, |_| {}, |_| {});
        manager.unsubscribe(handle.id);
        manager.unsubscribe(handle.id);
        handle.unsubscribe();

        assert!(handle.is_closed());
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc, |_| {}, |_| {});
        assert_eq!(manager.subscription_count(), 1);

        drop(handle);
        assert_eq!(manager.subscription_count(), 0);
        assert_eq!(backend.unlistens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_delivery_after_unsubscribe() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();
        let delivered = Arc::new(AtomicU64::new(0));

        let counter = delivered.clone();
        let handle = manager.subscribe(doc, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }, |_| {});
        let listener = backend.last_listener();

        backend.push(listener, doc_snapshot("42"));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        // Keep the sink alive past unsubscribe to model an in-flight
        // notification that was queued before teardown.
        let stale = backend.sinks.lock().get(&listener.0).cloned().unwrap();
        manager.unsubscribe(handle.id);
        stale(doc_snapshot("42"));

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_delivered_exactly_once_then_closed() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();
        let errors = Arc::new(AtomicU64::new(0));

        let counter = errors.clone();
        let handle = manager.subscribe(doc, |_| {}, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let listener = backend.last_listener();

        let sink = backend.sinks.lock().get(&listener.0).cloned().unwrap();
        sink(SnapshotEvent::Error(SyncError::PermissionDenied("inventory".into())));
        sink(SnapshotEvent::Error(SyncError::Unavailable("store down".into())));
        sink(doc_snapshot("42"));

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), SubscriptionState::Closed);
    }

    #[test]
    fn test_store_error_releases_listener_and_slot() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc, |_| {}, |_| {});
        let listener = backend.last_listener();
        assert_eq!(manager.subscription_count(), 1);

        backend.push(listener, SnapshotEvent::Error(SyncError::Unavailable("store down".into())));

        // Closed is terminal: the slot is gone and the store listener has
        // been torn down, not just muted.
        assert_eq!(handle.state(), SubscriptionState::Closed);
        assert_eq!(manager.subscription_count(), 0);
        assert_eq!(backend.unlistens.load(Ordering::SeqCst), 1);
        assert!(backend.sinks.lock().is_empty());
    }

    #[test]
    fn test_retarget_closes_old_listener_first() {
        let (backend, manager) = setup();
        let a = DocumentRef::parse("products/a").unwrap();
        let b = DocumentRef::parse("products/b").unwrap();
        let seen: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));

        let sink_seen = seen.clone();
        let handle = manager.subscribe(a, move |data| {
            if let SnapshotData::Document(Some(record)) = data {
                sink_seen.lock().push(record.id.0);
            }
        }, |_| {});
        let old_listener = backend.last_listener();
        let old_sink = backend.sinks.lock().get(&old_listener.0).cloned().unwrap();

        manager.retarget(handle.id, b).unwrap();
        assert_eq!(backend.unlistens.load(Ordering::SeqCst), 1);

        // A late emission from the old target must be discarded.
        old_sink(doc_snapshot("a"));
        backend.push(backend.last_listener(), doc_snapshot("b"));

        assert_eq!(*seen.lock(), vec!["b".to_string()]);
    }

    #[test]
    fn test_retarget_same_target_is_noop() {
        let (backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc.clone(), |_| {}, |_| {});
        let listens_before = backend.listens.load(Ordering::SeqCst);

        manager.retarget(handle.id, doc).unwrap();
        assert_eq!(backend.listens.load(Ordering::SeqCst), listens_before);
        assert_eq!(backend.unlistens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_retarget_closed_subscription_fails() {
        let (_backend, manager) = setup();
        let doc = DocumentRef::parse("products/42").unwrap();

        let handle = manager.subscribe(doc, |_| {}, |_| {});
        manager.unsubscribe(handle.id);

        let other = DocumentRef::parse("products/43").unwrap();
        assert!(matches!(
            manager.retarget(handle.id, other),
            Err(SyncError::InvalidArguments(_))
        ));
    }
}
