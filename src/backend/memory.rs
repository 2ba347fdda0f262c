//! In-process store backend with push notification.

use crate::error::{Result, SyncError};
use crate::refs::{CollectionRef, DocumentRef};
use crate::types::{Fields, MergeOption, SnapshotRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ListenerId, QueryDescriptor, SnapshotEvent, SnapshotSink, StoreBackend};

/// What a registered listener is watching.
enum ListenerTarget {
    Document(DocumentRef),
    Query(QueryDescriptor),
}

struct Listener {
    target: ListenerTarget,
    sink: SnapshotSink,
}

/// In-memory document store.
///
/// Documents live in a path-ordered table, so a query's natural result order
/// is path order. Mutations notify matching listeners synchronously on the
/// writer's thread, which is the push model the sync layer is built against.
pub struct MemoryBackend {
    /// Documents keyed by full path.
    documents: RwLock<BTreeMap<String, Fields>>,
    /// Active listeners by id.
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    /// Counter for listener ids.
    next_listener: AtomicU64,
    /// Counter for allocated document ids.
    next_doc: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            next_doc: AtomicU64::new(1),
        }
    }

    /// Number of documents currently stored.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn register(&self, target: ListenerTarget, sink: SnapshotSink) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, Listener { target, sink });
        id
    }

    /// Current state of one document.
    fn snapshot_document(&self, doc: &DocumentRef) -> Option<SnapshotRecord> {
        self.documents
            .read()
            .get(&doc.path())
            .map(|fields| SnapshotRecord::new(doc.id().0, fields.clone()))
    }

    /// Current result set of a query, in path order.
    fn evaluate_query(&self, query: &QueryDescriptor) -> Vec<SnapshotRecord> {
        let prefix = format!("{}/", query.collection.path());
        self.documents
            .read()
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, fields)| {
                // Direct children only; subcollection documents have deeper paths.
                let rest = &path[prefix.len()..];
                if rest.contains('/') {
                    return None;
                }
                let record = SnapshotRecord::new(rest, fields.clone());
                query.matches(&record).then_some(record)
            })
            .collect()
    }

    /// Notify every listener affected by a change at `doc`.
    ///
    /// Sinks are collected under the read lock and invoked outside it, so a
    /// sink may unlisten without deadlocking.
    fn notify_change(&self, doc: &DocumentRef) {
        let parent = doc.parent();
        let mut pending: Vec<(SnapshotSink, SnapshotEvent)> = Vec::new();

        {
            let listeners = self.listeners.read();
            for listener in listeners.values() {
                match &listener.target {
                    ListenerTarget::Document(watched) if watched == doc => {
                        pending.push((
                            listener.sink.clone(),
                            SnapshotEvent::Document(self.snapshot_document(watched)),
                        ));
                    }
                    ListenerTarget::Query(query) if query.collection == parent => {
                        pending.push((
                            listener.sink.clone(),
                            SnapshotEvent::Query(self.evaluate_query(query)),
                        ));
                    }
                    _ => {}
                }
            }
        }

        for (sink, event) in pending {
            sink(event);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for MemoryBackend {
    fn listen_document(&self, doc: &DocumentRef, sink: SnapshotSink) -> Result<ListenerId> {
        // Register before reading the initial snapshot: a write landing in
        // between then notifies the listener, and the initial (computed
        // afterward) already includes it. A duplicate emission is harmless;
        // a lost one is not.
        let id = self.register(ListenerTarget::Document(doc.clone()), sink.clone());
        sink(SnapshotEvent::Document(self.snapshot_document(doc)));
        Ok(id)
    }

    fn listen_query(&self, query: &QueryDescriptor, sink: SnapshotSink) -> Result<ListenerId> {
        let id = self.register(ListenerTarget::Query(query.clone()), sink.clone());
        sink(SnapshotEvent::Query(self.evaluate_query(query)));
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.write().remove(&id);
    }

    fn create(&self, collection: &CollectionRef, fields: Fields) -> Result<DocumentRef> {
        let id = format!("doc-{}", self.next_doc.fetch_add(1, Ordering::SeqCst));
        let doc = collection.doc(&id);
        self.documents.write().insert(doc.path(), fields);
        self.notify_change(&doc);
        Ok(doc)
    }

    fn set(&self, doc: &DocumentRef, fields: Fields, merge: MergeOption) -> Result<()> {
        {
            let mut documents = self.documents.write();
            match merge {
                MergeOption::Replace => {
                    documents.insert(doc.path(), fields);
                }
                MergeOption::Merge => {
                    let entry = documents.entry(doc.path()).or_default();
                    for (key, value) in fields {
                        entry.insert(key, value);
                    }
                }
            }
        }
        self.notify_change(doc);
        Ok(())
    }

    fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<()> {
        {
            let mut documents = self.documents.write();
            let entry = documents
                .get_mut(&doc.path())
                .ok_or_else(|| SyncError::NotFound(doc.path()))?;
            for (key, value) in fields {
                entry.insert(key, value);
            }
        }
        self.notify_change(doc);
        Ok(())
    }

    fn delete(&self, doc: &DocumentRef) -> Result<()> {
        let existed = self.documents.write().remove(&doc.path()).is_some();
        if existed {
            self.notify_change(doc);
        }
        Ok(())
    }
}
