//! Non-blocking write gateway.

use crate::backend::StoreBackend;
use crate::error::{Result, SyncError};
use crate::events::ErrorChannel;
use crate::refs::{CollectionArg, CollectionRef, DocArg, DocumentRef};
use crate::types::{ErrorEvent, Fields, MergeOption, WriteKind};
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::handle::WriteHandle;

/// A queued mutation, owned by the gateway until it settles.
enum WriteJob {
    Create {
        collection: CollectionRef,
        fields: Fields,
        done: Sender<Result<DocumentRef>>,
    },
    Set {
        doc: DocumentRef,
        fields: Fields,
        merge: MergeOption,
        done: Sender<Result<()>>,
    },
    Update {
        doc: DocumentRef,
        fields: Fields,
        done: Sender<Result<()>>,
    },
    Delete {
        doc: DocumentRef,
        done: Sender<Result<()>>,
    },
}

impl WriteJob {
    fn kind(&self) -> WriteKind {
        match self {
            WriteJob::Create { .. } => WriteKind::Create,
            WriteJob::Set { .. } => WriteKind::Set,
            WriteJob::Update { .. } => WriteKind::Update,
            WriteJob::Delete { .. } => WriteKind::Delete,
        }
    }

    fn path(&self) -> String {
        match self {
            WriteJob::Create { collection, .. } => collection.path(),
            WriteJob::Set { doc, .. }
            | WriteJob::Update { doc, .. }
            | WriteJob::Delete { doc, .. } => doc.path(),
        }
    }
}

/// Issues writes against the store without blocking the caller.
///
/// Each operation validates its reference synchronously, queues a job for
/// the worker thread, and returns a [`WriteHandle`] immediately. The worker
/// settles the handle and, independently, pushes an [`ErrorEvent`] onto the
/// error channel for every failure - two consumers of the same settled
/// result, so nothing is lost when the caller ignores the handle.
///
/// One worker thread executes jobs in issue order. The gateway promises no
/// ordering across targets; callers that need writes to the same reference
/// sequenced should wait on each handle themselves.
pub struct WriteGateway {
    jobs: Option<Sender<WriteJob>>,
    worker: Option<JoinHandle<()>>,
}

impl WriteGateway {
    pub fn new(backend: Arc<dyn StoreBackend>, errors: Arc<ErrorChannel>) -> Self {
        let (jobs, queue) = unbounded::<WriteJob>();
        let worker = thread::Builder::new()
            .name("livesync-writes".to_string())
            .spawn(move || {
                for job in queue {
                    let kind = job.kind();
                    let path = job.path();
                    debug!(%kind, %path, "executing write");
                    match job {
                        WriteJob::Create {
                            collection,
                            fields,
                            done,
                        } => {
                            let result = backend.create(&collection, fields);
                            if let Err(err) = &result {
                                report(&errors, kind, &path, err);
                            }
                            let _ = done.send(result);
                        }
                        WriteJob::Set {
                            doc,
                            fields,
                            merge,
                            done,
                        } => {
                            let result = backend.set(&doc, fields, merge);
                            if let Err(err) = &result {
                                report(&errors, kind, &path, err);
                            }
                            let _ = done.send(result);
                        }
                        WriteJob::Update { doc, fields, done } => {
                            let result = backend.update(&doc, fields);
                            if let Err(err) = &result {
                                report(&errors, kind, &path, err);
                            }
                            let _ = done.send(result);
                        }
                        WriteJob::Delete { doc, done } => {
                            let result = backend.delete(&doc);
                            if let Err(err) = &result {
                                report(&errors, kind, &path, err);
                            }
                            let _ = done.send(result);
                        }
                    }
                }
            })
            .expect("failed to spawn write worker");

        Self {
            jobs: Some(jobs),
            worker: Some(worker),
        }
    }

    /// Create a document with a freshly allocated id in `collection`.
    ///
    /// Fails synchronously with `InvalidReferenceKind` when given a document
    /// reference or a document path.
    pub fn create(
        &self,
        collection: impl Into<CollectionArg>,
        fields: Fields,
    ) -> Result<WriteHandle<DocumentRef>> {
        let collection = collection.into().resolve()?;
        let (done, handle) = WriteHandle::channel();
        self.enqueue(WriteJob::Create {
            collection,
            fields,
            done,
        })?;
        Ok(handle)
    }

    /// Write a document's fields, replacing or merging per `merge`.
    pub fn set(
        &self,
        doc: impl Into<DocArg>,
        fields: Fields,
        merge: MergeOption,
    ) -> Result<WriteHandle<()>> {
        let doc = doc.into().resolve()?;
        let (done, handle) = WriteHandle::channel();
        self.enqueue(WriteJob::Set {
            doc,
            fields,
            merge,
            done,
        })?;
        Ok(handle)
    }

    /// Update fields of an existing document. The write settles with
    /// `NotFound` if the document does not exist.
    pub fn update(&self, doc: impl Into<DocArg>, fields: Fields) -> Result<WriteHandle<()>> {
        let doc = doc.into().resolve()?;
        let (done, handle) = WriteHandle::channel();
        self.enqueue(WriteJob::Update { doc, fields, done })?;
        Ok(handle)
    }

    /// Delete a document. Removing a non-existent document is not an error.
    pub fn remove(&self, doc: impl Into<DocArg>) -> Result<WriteHandle<()>> {
        let doc = doc.into().resolve()?;
        let (done, handle) = WriteHandle::channel();
        self.enqueue(WriteJob::Delete { doc, done })?;
        Ok(handle)
    }

    fn enqueue(&self, job: WriteJob) -> Result<()> {
        self.jobs
            .as_ref()
            .ok_or(SyncError::ChannelClosed)?
            .send(job)
            .map_err(|_| SyncError::ChannelClosed)
    }
}

fn report(errors: &ErrorChannel, kind: WriteKind, path: &str, err: &SyncError) {
    warn!(%kind, %path, error = %err, "write failed");
    errors.emit(ErrorEvent::new(kind, path, err.to_string()));
}

impl Drop for WriteGateway {
    fn drop(&mut self) {
        // Close the queue, then wait for in-flight jobs to settle.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
