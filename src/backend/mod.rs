//! Store backend seam.
//!
//! The remote document store sits behind [`StoreBackend`], a push-based
//! listener/write interface. The subscription manager and write gateway are
//! written against this trait; [`MemoryBackend`] is the in-process
//! implementation used by tests and as a local store.

mod memory;

pub use memory::MemoryBackend;

use crate::error::Result;
use crate::refs::{CollectionRef, DocumentRef};
use crate::types::{Fields, MergeOption, SnapshotRecord};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identifier of a registered listener, used to tear it down.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// One push notification from the store.
#[derive(Debug)]
pub enum SnapshotEvent {
    /// Current state of a single document. `None` when it does not exist.
    Document(Option<SnapshotRecord>),
    /// Current result set of a query, in the store's natural order.
    Query(Vec<SnapshotRecord>),
    /// Store-level listener failure, forwarded verbatim.
    Error(crate::error::SyncError),
}

/// Callback receiving push notifications for one listener.
pub type SnapshotSink = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Equality filter on a top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub equals: Value,
}

/// A live query: a collection plus optional equality filters.
///
/// Result order is the backend's natural order; this layer imposes no extra
/// sort.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDescriptor {
    pub collection: CollectionRef,
    pub filters: Vec<FieldFilter>,
}

impl QueryDescriptor {
    pub fn collection(collection: CollectionRef) -> Self {
        Self {
            collection,
            filters: Vec::new(),
        }
    }

    /// Add an equality filter on a top-level field.
    pub fn where_eq(mut self, field: impl Into<String>, equals: Value) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            equals,
        });
        self
    }

    /// Whether a record satisfies every filter.
    pub fn matches(&self, record: &SnapshotRecord) -> bool {
        self.filters
            .iter()
            .all(|f| record.field(&f.field) == Some(&f.equals))
    }
}

/// Push-based document store.
///
/// Listeners receive an initial snapshot at registration, then one
/// notification per change. Implementations deliver notifications from
/// whichever thread performs the mutation; sinks must be `Send + Sync`.
pub trait StoreBackend: Send + Sync {
    /// Register a listener on a single document.
    fn listen_document(&self, doc: &DocumentRef, sink: SnapshotSink) -> Result<ListenerId>;

    /// Register a listener on a query result set.
    fn listen_query(&self, query: &QueryDescriptor, sink: SnapshotSink) -> Result<ListenerId>;

    /// Tear down a listener. Unknown ids are ignored.
    fn unlisten(&self, id: ListenerId);

    /// Create a document with a freshly allocated id.
    fn create(&self, collection: &CollectionRef, fields: Fields) -> Result<DocumentRef>;

    /// Write a document's fields, replacing or merging per `merge`.
    fn set(&self, doc: &DocumentRef, fields: Fields, merge: MergeOption) -> Result<()>;

    /// Update fields of an existing document. Fails with `NotFound` if the
    /// document does not exist.
    fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<()>;

    /// Delete a document. Deleting a non-existent document is not an error.
    fn delete(&self, doc: &DocumentRef) -> Result<()>;
}
