//! Live subscriptions over the store backend.
//!
//! A subscription binds one callback pair to one document or query and walks
//! an explicit `Idle -> Attaching -> Streaming -> Closed` state machine.
//! Cancellation is a flag check before every callback invocation, so a
//! snapshot already in flight when `unsubscribe` runs is never delivered.
//! Retargeting closes the old store listener before opening the new one and
//! discards late emissions from the old target.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(backend);
//! let doc = DocumentRef::parse("products/42")?;
//!
//! let handle = manager.subscribe(
//!     doc,
//!     |data| println!("snapshot: {:?}", data),
//!     |err| eprintln!("subscription failed: {err}"),
//! );
//!
//! // ... later
//! manager.unsubscribe(handle.id);
//! ```

mod manager;
mod types;

pub use manager::{SubscriptionHandle, SubscriptionManager};
pub use types::{
    DataCallback, ErrorCallback, SnapshotData, SubscriptionId, SubscriptionState,
    SubscriptionTarget,
};
