//! Command protocol between async callers and the queue actor thread

use tokio::sync::oneshot;

use jobstore::{Job, QueueError};

/// Commands processed by the queue actor
#[derive(Debug)]
pub enum QueueCommand {
    /// Append a job to the tail
    Enqueue {
        job: Job,
        reply: oneshot::Sender<Result<u64, QueueError>>,
    },

    /// Remove and return the head job, if any
    TryDequeue {
        reply: oneshot::Sender<Result<Option<Job>, QueueError>>,
    },

    /// Report queue depth
    Len {
        reply: oneshot::Sender<Result<u64, QueueError>>,
    },
}
