//! Subscription types for live document updates.

use crate::backend::QueryDescriptor;
use crate::error::SyncError;
use crate::refs::DocumentRef;
use crate::types::SnapshotRecord;
use std::fmt;
use std::sync::Arc;

/// What a subscription is bound to.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionTarget {
    /// A single document.
    Document(DocumentRef),
    /// A query result set.
    Query(QueryDescriptor),
}

impl From<DocumentRef> for SubscriptionTarget {
    fn from(doc: DocumentRef) -> Self {
        SubscriptionTarget::Document(doc)
    }
}

impl From<QueryDescriptor> for SubscriptionTarget {
    fn from(query: QueryDescriptor) -> Self {
        SubscriptionTarget::Query(query)
    }
}

/// Lifecycle of a subscription.
///
/// `Attaching` is entered when the subscription opens, `Streaming` on the
/// first snapshot. Any store-level error, or an unsubscribe, moves to
/// `Closed`; no callback is invoked after that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Attaching,
    Streaming,
    Closed,
}

/// Data delivered to a subscription's `on_data` callback.
#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotData {
    /// Single-document target: `None` when the document does not exist.
    Document(Option<SnapshotRecord>),
    /// Query target: records in the store's natural order.
    Query(Vec<SnapshotRecord>),
}

/// Callback receiving snapshot data.
pub type DataCallback = Arc<dyn Fn(SnapshotData) + Send + Sync>;

/// Callback receiving a store-level subscription error. Invoked at most once.
pub type ErrorCallback = Arc<dyn Fn(SyncError) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}
