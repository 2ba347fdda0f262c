//! Pending-operation handles for non-blocking writes.

use crate::error::{Result, SyncError};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::Duration;

/// Handle to a write that has been queued but not necessarily settled.
///
/// The gateway settles the handle exactly once. Callers may wait on it,
/// poll it, or drop it; dropping never cancels the write, and failures
/// reach the error channel regardless.
#[derive(Debug)]
pub struct WriteHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> WriteHandle<T> {
    /// Create a handle and the sender that settles it.
    pub(crate) fn channel() -> (Sender<Result<T>>, Self) {
        let (sender, receiver) = bounded(1);
        (sender, Self { receiver })
    }

    /// Block until the write settles.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| SyncError::ChannelClosed)?
    }

    /// Return the result if the write has already settled.
    pub fn try_result(&self) -> Option<Result<T>> {
        self.receiver.try_recv().ok()
    }

    /// Block up to `timeout` for the write to settle.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        self.receiver.recv_timeout(timeout).ok()
    }
}
