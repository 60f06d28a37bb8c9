//! Async client interface over the blocking durable queue

mod handle;
mod messages;

pub use handle::QueueHandle;
pub use messages::QueueCommand;

use std::time::Duration;

use async_trait::async_trait;

use jobstore::{Job, QueueError};

/// Client interface to the durable queue, as the daemon sees it.
///
/// Every process may enqueue; only the consumer-lock holder may dequeue.
/// Tests substitute an in-memory implementation so dispatch timing can be
/// driven deterministically under a paused clock.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Append a job to the tail; returns once it is durably accepted
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Wait up to `timeout` for a head element. `Ok(None)` means no job
    /// arrived - an expected idle condition, not an error.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, QueueError>;

    /// Number of jobs currently queued
    async fn len(&self) -> Result<u64, QueueError>;
}
