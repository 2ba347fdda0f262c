//! Client facade tying the sync layer together.
//!
//! [`SyncClient`] is the process-wide store handle: it owns the backend, the
//! subscription manager, the write gateway, and the error channel, and
//! exposes the consumer-facing contract - live views over documents and
//! collections plus the non-blocking write operations.

use crate::backend::{QueryDescriptor, StoreBackend};
use crate::error::{Result, SyncError};
use crate::events::ErrorChannel;
use crate::refs::{CollectionArg, DocArg, DocumentRef};
use crate::subscriptions::{
    SnapshotData, SubscriptionHandle, SubscriptionManager, SubscriptionTarget,
};
use crate::types::{Fields, MergeOption, SnapshotRecord};
use crate::writes::{WriteGateway, WriteHandle};
use parking_lot::Mutex;
use std::sync::Arc;

/// Consumer-visible state of a live view.
///
/// `loading` is true until the first snapshot arrives. On a store error the
/// last-known data is retained and `error` is set; fresh data clears it.
#[derive(Clone, Debug)]
pub struct LiveState<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<SyncError>,
}

impl<T: Default> Default for LiveState<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            loading: true,
            error: None,
        }
    }
}

type SharedState<T> = Arc<Mutex<LiveState<T>>>;

/// Live view over a single document.
///
/// Holds exactly one subscription; dropping the view tears it down.
pub struct LiveDocument {
    manager: Arc<SubscriptionManager>,
    handle: SubscriptionHandle,
    state: SharedState<Option<SnapshotRecord>>,
}

impl LiveDocument {
    /// Snapshot of the current state.
    pub fn state(&self) -> LiveState<Option<SnapshotRecord>> {
        self.state.lock().clone()
    }

    /// Current data, if any.
    pub fn data(&self) -> Option<SnapshotRecord> {
        self.state.lock().data.clone()
    }

    /// Whether the first snapshot is still pending.
    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Rebind to a different document. The old listener is torn down before
    /// the new one opens; a no-op when the target is structurally equal.
    pub fn set_target(&self, doc: impl Into<DocArg>) -> Result<()> {
        let doc = doc.into().resolve()?;
        self.state.lock().loading = true;
        self.manager.retarget(self.handle.id, doc)
    }

    /// Stop receiving updates. Also happens on drop.
    pub fn unsubscribe(&self) {
        self.manager.unsubscribe(self.handle.id);
    }
}

impl Drop for LiveDocument {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.handle.id);
    }
}

/// Live view over a collection or query result set.
pub struct LiveCollection {
    manager: Arc<SubscriptionManager>,
    handle: SubscriptionHandle,
    state: SharedState<Vec<SnapshotRecord>>,
}

impl LiveCollection {
    /// Snapshot of the current state.
    pub fn state(&self) -> LiveState<Vec<SnapshotRecord>> {
        self.state.lock().clone()
    }

    /// Current result set, in the store's natural order.
    pub fn data(&self) -> Vec<SnapshotRecord> {
        self.state.lock().data.clone()
    }

    /// Whether the first snapshot is still pending.
    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Rebind to a different query. Same discipline as
    /// [`LiveDocument::set_target`].
    pub fn set_query(&self, query: QueryDescriptor) -> Result<()> {
        self.state.lock().loading = true;
        self.manager.retarget(self.handle.id, query)
    }

    /// Rebind to a different collection.
    pub fn set_target(&self, collection: impl Into<CollectionArg>) -> Result<()> {
        let collection = collection.into().resolve()?;
        self.set_query(QueryDescriptor::collection(collection))
    }

    /// Stop receiving updates. Also happens on drop.
    pub fn unsubscribe(&self) {
        self.manager.unsubscribe(self.handle.id);
    }
}

impl Drop for LiveCollection {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.handle.id);
    }
}

/// The process-wide entry point to the sync layer.
pub struct SyncClient {
    subscriptions: Arc<SubscriptionManager>,
    gateway: WriteGateway,
    errors: Arc<ErrorChannel>,
}

impl SyncClient {
    /// Build a client with its own error channel.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self::with_error_channel(backend, Arc::new(ErrorChannel::new()))
    }

    /// Build a client sharing an externally constructed error channel.
    pub fn with_error_channel(backend: Arc<dyn StoreBackend>, errors: Arc<ErrorChannel>) -> Self {
        let subscriptions = Arc::new(SubscriptionManager::new(backend.clone()));
        let gateway = WriteGateway::new(backend, errors.clone());
        Self {
            subscriptions,
            gateway,
            errors,
        }
    }

    /// The channel write failures are broadcast on.
    pub fn errors(&self) -> &Arc<ErrorChannel> {
        &self.errors
    }

    /// The underlying subscription manager.
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Open a live view over a single document.
    pub fn live_document(&self, doc: impl Into<DocArg>) -> Result<LiveDocument> {
        let doc = doc.into().resolve()?;
        let state: SharedState<Option<SnapshotRecord>> = Arc::new(Mutex::new(LiveState::default()));

        let on_data_state = state.clone();
        let on_error_state = state.clone();
        let handle = self.subscriptions.subscribe(
            doc,
            move |data| {
                if let SnapshotData::Document(snapshot) = data {
                    let mut state = on_data_state.lock();
                    state.data = snapshot;
                    state.loading = false;
                    state.error = None;
                }
            },
            move |err| {
                let mut state = on_error_state.lock();
                state.loading = false;
                state.error = Some(err);
            },
        );

        Ok(LiveDocument {
            manager: self.subscriptions.clone(),
            handle,
            state,
        })
    }

    /// Open a live view over a whole collection.
    pub fn live_collection(&self, collection: impl Into<CollectionArg>) -> Result<LiveCollection> {
        let collection = collection.into().resolve()?;
        Ok(self.live_query(QueryDescriptor::collection(collection)))
    }

    /// Open a live view over a filtered query.
    pub fn live_query(&self, query: QueryDescriptor) -> LiveCollection {
        let state: SharedState<Vec<SnapshotRecord>> = Arc::new(Mutex::new(LiveState::default()));

        let on_data_state = state.clone();
        let on_error_state = state.clone();
        let handle = self.subscriptions.subscribe(
            SubscriptionTarget::Query(query),
            move |data| {
                if let SnapshotData::Query(records) = data {
                    let mut state = on_data_state.lock();
                    state.data = records;
                    state.loading = false;
                    state.error = None;
                }
            },
            move |err| {
                let mut state = on_error_state.lock();
                state.loading = false;
                state.error = Some(err);
            },
        );

        LiveCollection {
            manager: self.subscriptions.clone(),
            handle,
            state,
        }
    }

    /// Create a document without blocking; the handle resolves to the new
    /// document's reference.
    pub fn add_document_non_blocking(
        &self,
        collection: impl Into<CollectionArg>,
        fields: Fields,
    ) -> Result<WriteHandle<DocumentRef>> {
        self.gateway.create(collection, fields)
    }

    /// Set a document's fields without blocking. `merge` defaults to
    /// replacing the document wholesale.
    pub fn set_document_non_blocking(
        &self,
        doc: impl Into<DocArg>,
        fields: Fields,
        merge: Option<MergeOption>,
    ) -> Result<WriteHandle<()>> {
        self.gateway.set(doc, fields, merge.unwrap_or_default())
    }

    /// Update an existing document without blocking.
    pub fn update_document_non_blocking(
        &self,
        doc: impl Into<DocArg>,
        fields: Fields,
    ) -> Result<WriteHandle<()>> {
        self.gateway.update(doc, fields)
    }

    /// Delete a document without blocking. Idempotent.
    pub fn delete_document_non_blocking(&self, doc: impl Into<DocArg>) -> Result<WriteHandle<()>> {
        self.gateway.remove(doc)
    }
}
