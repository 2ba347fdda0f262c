//! Error taxonomy and error-channel behavior.

use livesync::{
    CollectionRef, DocumentRef, ErrorEvent, Fields, ListenerId, MemoryBackend, MergeOption,
    QueryDescriptor, RefKind, Result, SnapshotEvent, SnapshotRecord, SnapshotSink, StoreBackend,
    SyncClient, SyncError, WriteKind,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().expect("object literal").clone()
}

#[test]
fn test_kind_mismatch_fails_synchronously_for_every_operation() {
    let client = SyncClient::new(Arc::new(MemoryBackend::new()));
    let payload = fields(json!({"name": "Urea"}));

    // Collection path where a document is required.
    for result in [
        client
            .set_document_non_blocking("products", payload.clone(), None)
            .map(|_| ()),
        client
            .update_document_non_blocking("products", payload.clone())
            .map(|_| ()),
        client.delete_document_non_blocking("products").map(|_| ()),
    ] {
        assert!(matches!(
            result,
            Err(SyncError::InvalidReferenceKind {
                expected: RefKind::Document,
                ..
            })
        ));
    }

    // Document path where a collection is required.
    assert!(matches!(
        client.add_document_non_blocking("products/42", payload),
        Err(SyncError::InvalidReferenceKind {
            expected: RefKind::Collection,
            ..
        })
    ));
}

#[test]
fn test_wrong_reference_type_is_never_coerced() {
    let client = SyncClient::new(Arc::new(MemoryBackend::new()));
    let collection = CollectionRef::parse("products").unwrap();
    let document = DocumentRef::parse("products/42").unwrap();

    assert!(matches!(
        client.set_document_non_blocking(collection, fields(json!({"a": 1})), None),
        Err(SyncError::InvalidReferenceKind { .. })
    ));
    assert!(matches!(
        client.add_document_non_blocking(document, fields(json!({"a": 1}))),
        Err(SyncError::InvalidReferenceKind { .. })
    ));
}

#[test]
fn test_update_missing_document_emits_one_error_event() {
    let client = SyncClient::new(Arc::new(MemoryBackend::new()));
    let events: Arc<Mutex<Vec<ErrorEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = events.clone();
    let _guard = client.errors().observe(move |event| sink.lock().push(event.clone()));

    let handle = client
        .update_document_non_blocking("products/ghost-1", fields(json!({"qty": 1})))
        .unwrap();
    assert!(matches!(handle.wait(), Err(SyncError::NotFound(_))));

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, WriteKind::Update);
    assert_eq!(events[0].path, "products/ghost-1");
}

#[test]
fn test_successful_writes_emit_no_error_events() {
    let client = SyncClient::new(Arc::new(MemoryBackend::new()));
    let events: Arc<Mutex<Vec<ErrorEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = events.clone();
    let _guard = client.errors().observe(move |event| sink.lock().push(event.clone()));

    client
        .set_document_non_blocking("products/42", fields(json!({"name": "Urea"})), None)
        .unwrap()
        .wait()
        .unwrap();
    client.delete_document_non_blocking("products/42").unwrap().wait().unwrap();

    assert!(events.lock().is_empty());
}

/// Backend that refuses everything, for checking verbatim forwarding.
struct DenyingBackend;

impl StoreBackend for DenyingBackend {
    fn listen_document(&self, doc: &DocumentRef, sink: SnapshotSink) -> Result<ListenerId> {
        sink(SnapshotEvent::Error(SyncError::PermissionDenied(doc.path())));
        Ok(ListenerId(1))
    }

    fn listen_query(&self, query: &QueryDescriptor, sink: SnapshotSink) -> Result<ListenerId> {
        sink(SnapshotEvent::Error(SyncError::PermissionDenied(
            query.collection.path(),
        )));
        Ok(ListenerId(1))
    }

    fn unlisten(&self, _id: ListenerId) {}

    fn create(&self, collection: &CollectionRef, _fields: Fields) -> Result<DocumentRef> {
        Err(SyncError::PermissionDenied(collection.path()))
    }

    fn set(&self, doc: &DocumentRef, _fields: Fields, _merge: MergeOption) -> Result<()> {
        Err(SyncError::PermissionDenied(doc.path()))
    }

    fn update(&self, doc: &DocumentRef, _fields: Fields) -> Result<()> {
        Err(SyncError::Unavailable(doc.path()))
    }

    fn delete(&self, doc: &DocumentRef) -> Result<()> {
        Err(SyncError::PermissionDenied(doc.path()))
    }
}

#[test]
fn test_store_errors_forwarded_verbatim_to_subscription() {
    let client = SyncClient::new(Arc::new(DenyingBackend));

    let view = client.live_document("inventory/i1").unwrap();
    let state = view.state();
    assert!(!state.loading);
    assert!(matches!(state.error, Some(SyncError::PermissionDenied(p)) if p == "inventory/i1"));
    // Last-known data is retained (here: none was ever delivered).
    assert!(state.data.is_none());
}

/// Backend that delivers one good document snapshot and lets the test push
/// a store failure afterward.
struct FlakyBackend {
    sink: Mutex<Option<SnapshotSink>>,
}

impl FlakyBackend {
    fn new() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }
}

impl StoreBackend for FlakyBackend {
    fn listen_document(&self, doc: &DocumentRef, sink: SnapshotSink) -> Result<ListenerId> {
        sink(SnapshotEvent::Document(Some(SnapshotRecord::new(
            doc.id().0,
            fields(json!({"name": "Urea", "price": 450})),
        ))));
        *self.sink.lock() = Some(sink);
        Ok(ListenerId(1))
    }

    fn listen_query(&self, _query: &QueryDescriptor, sink: SnapshotSink) -> Result<ListenerId> {
        sink(SnapshotEvent::Query(Vec::new()));
        *self.sink.lock() = Some(sink);
        Ok(ListenerId(1))
    }

    fn unlisten(&self, _id: ListenerId) {
        self.sink.lock().take();
    }

    fn create(&self, _collection: &CollectionRef, _fields: Fields) -> Result<DocumentRef> {
        unimplemented!("flaky backend is read-only")
    }

    fn set(&self, _doc: &DocumentRef, _fields: Fields, _merge: MergeOption) -> Result<()> {
        unimplemented!("flaky backend is read-only")
    }

    fn update(&self, _doc: &DocumentRef, _fields: Fields) -> Result<()> {
        unimplemented!("flaky backend is read-only")
    }

    fn delete(&self, _doc: &DocumentRef) -> Result<()> {
        unimplemented!("flaky backend is read-only")
    }
}

#[test]
fn test_error_after_data_keeps_last_known_record() {
    let backend = Arc::new(FlakyBackend::new());
    let client = SyncClient::new(backend.clone());

    let view = client.live_document("products/42").unwrap();
    assert_eq!(view.data().unwrap().field("name"), Some(&json!("Urea")));

    let sink = backend.sink.lock().clone().expect("listener registered");
    sink(SnapshotEvent::Error(SyncError::Unavailable("store down".into())));

    // The transient error is surfaced, but the last-known data stays up.
    let state = view.state();
    assert!(matches!(state.error, Some(SyncError::Unavailable(_))));
    assert!(!state.loading);
    let record = state.data.expect("last-known data retained");
    assert_eq!(record.field("name"), Some(&json!("Urea")));
    assert_eq!(record.field("price"), Some(&json!(450)));
}

#[test]
fn test_store_write_errors_keep_their_kind_on_the_handle() {
    let client = SyncClient::new(Arc::new(DenyingBackend));

    let err = client
        .set_document_non_blocking("products/42", fields(json!({"a": 1})), None)
        .unwrap()
        .wait()
        .unwrap_err();
    assert!(matches!(err, SyncError::PermissionDenied(_)));

    let err = client
        .update_document_non_blocking("products/42", fields(json!({"a": 1})))
        .unwrap()
        .wait()
        .unwrap_err();
    assert!(matches!(err, SyncError::Unavailable(_)));
}

#[test]
fn test_every_failed_write_kind_is_tagged_on_the_channel() {
    let client = SyncClient::new(Arc::new(DenyingBackend));
    let sources: Arc<Mutex<Vec<WriteKind>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = sources.clone();
    let _guard = client.errors().observe(move |event| sink.lock().push(event.source));

    let payload = fields(json!({"a": 1}));
    client
        .add_document_non_blocking("products", payload.clone())
        .unwrap()
        .wait()
        .unwrap_err();
    client
        .set_document_non_blocking("products/42", payload.clone(), None)
        .unwrap()
        .wait()
        .unwrap_err();
    client
        .update_document_non_blocking("products/42", payload)
        .unwrap()
        .wait()
        .unwrap_err();
    client
        .delete_document_non_blocking("products/42")
        .unwrap()
        .wait()
        .unwrap_err();

    assert_eq!(
        *sources.lock(),
        vec![WriteKind::Create, WriteKind::Set, WriteKind::Update, WriteKind::Delete]
    );
}

#[test]
fn test_malformed_paths_rejected_before_any_write() {
    let client = SyncClient::new(Arc::new(MemoryBackend::new()));

    for path in ["", "/", "products//42", "/products/42", "products/42/"] {
        assert!(matches!(
            client.set_document_non_blocking(path, fields(json!({"a": 1})), None),
            Err(SyncError::InvalidReferenceKind { .. })
        ));
    }
}
