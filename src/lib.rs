//! # Live Document Sync Layer
//!
//! A thin abstraction over a push-based remote document store:
//!
//! - **References**: typed document/collection handles, normalized from
//!   heterogeneous path/reference inputs
//! - **Subscriptions**: live channels onto a document or query, with an
//!   explicit lifecycle and leak-free retargeting
//! - **Writes**: create/set/update/delete issued off the caller's critical
//!   path, with a pending-operation handle per write
//! - **Error channel**: a broadcast point so write failures are never
//!   silently lost
//!
//! ## Example
//!
//! ```ignore
//! use livesync::{MemoryBackend, SyncClient};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let client = SyncClient::new(Arc::new(MemoryBackend::new()));
//!
//! // Live view over a collection
//! let products = client.live_collection("products")?;
//!
//! // Fire-and-forget write; failures still reach client.errors()
//! let _ = client.add_document_non_blocking(
//!     "products",
//!     json!({"name": "Urea", "price": 450}).as_object().cloned().unwrap(),
//! )?;
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod events;
pub mod refs;
pub mod subscriptions;
pub mod types;
pub mod writes;

// Re-exports
pub use backend::{
    FieldFilter, ListenerId, MemoryBackend, QueryDescriptor, SnapshotEvent, SnapshotSink,
    StoreBackend,
};
pub use client::{LiveCollection, LiveDocument, LiveState, SyncClient};
pub use error::{Result, SyncError};
pub use events::{ErrorChannel, ObserverGuard};
pub use refs::{CollectionArg, CollectionRef, DocArg, DocumentRef, RefKind};
pub use subscriptions::{
    SnapshotData, SubscriptionHandle, SubscriptionId, SubscriptionManager, SubscriptionState,
    SubscriptionTarget,
};
pub use types::*;
pub use writes::{WriteGateway, WriteHandle};
