//! Non-blocking writes against the store.
//!
//! The gateway queues every mutation onto a worker thread and returns a
//! pending-operation handle immediately, keeping writes off the caller's
//! critical path. Failures settle the handle and are broadcast on the error
//! channel, whichever the caller chooses to watch.

mod gateway;
mod handle;

pub use gateway::WriteGateway;
pub use handle::WriteHandle;
