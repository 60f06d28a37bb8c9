//! QueueHandle - actor that owns the blocking store connection
//!
//! `jobstore` speaks blocking SQLite, so a dedicated thread owns the
//! connection and async callers reach it over a channel. Only fast store
//! operations run on the actor; the dequeue wait itself lives on the async
//! side, so an enqueue is never stuck behind a consumer poll.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use jobstore::{Job, JobQueue, QueueError};

use super::QueueClient;
use super::messages::QueueCommand;

/// Handle for talking to the queue actor. Cheap to clone; all clones share
/// the single actor thread and therefore one store connection.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<QueueCommand>,
    poll_interval: Duration,
}

impl QueueHandle {
    /// Open the store at `queue_path` and spawn the actor thread
    pub fn spawn(queue_path: PathBuf, poll_interval: Duration) -> Result<Self> {
        let queue = JobQueue::open(&queue_path).context("Failed to open job queue")?;

        let (tx, rx) = mpsc::channel(256);

        std::thread::Builder::new()
            .name("jobqueue-actor".to_string())
            .spawn(move || actor_loop(queue, rx))
            .context("Failed to spawn queue actor thread")?;

        info!(path = %queue_path.display(), "Queue actor spawned");
        Ok(Self { tx, poll_interval })
    }

    async fn try_dequeue(&self) -> Result<Option<Job>, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::TryDequeue { reply: reply_tx })
            .await
            .map_err(|_| actor_stopped())?;
        reply_rx.await.map_err(|_| actor_stopped())?
    }
}

fn actor_loop(queue: JobQueue, mut rx: mpsc::Receiver<QueueCommand>) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            QueueCommand::Enqueue { job, reply } => {
                let _ = reply.send(queue.enqueue(&job));
            }
            QueueCommand::TryDequeue { reply } => {
                let _ = reply.send(queue.try_dequeue());
            }
            QueueCommand::Len { reply } => {
                let _ = reply.send(queue.len());
            }
        }
    }
    debug!("Queue actor channel closed; exiting");
}

fn actor_stopped() -> QueueError {
    QueueError::Unavailable("queue actor stopped".to_string())
}

#[async_trait]
impl QueueClient for QueueHandle {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Enqueue { job, reply: reply_tx })
            .await
            .map_err(|_| actor_stopped())?;
        reply_rx.await.map_err(|_| actor_stopped())?.map(|_seq| ())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_dequeue().await? {
                return Ok(Some(job));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Len { reply: reply_tx })
            .await
            .map_err(|_| actor_stopped())?;
        reply_rx.await.map_err(|_| actor_stopped())?
    }
}
