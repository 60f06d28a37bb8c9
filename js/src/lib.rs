//! JobStore - durable FIFO job queue
//!
//! Persists pending jobs in SQLite so queued work survives process crashes
//! and restarts. Any number of processes may enqueue; the process holding
//! the [`ConsumerLock`] is the only one allowed to dequeue.
//!
//! # Architecture
//!
//! ```text
//! {store_path}/
//! ├── queue.db        # SQLite database, one row per pending job (FIFO by seq)
//! ├── queue.db-wal    # WAL journal
//! └── queue.lock      # consumer lock file (holder PID inside)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use jobstore::{ConsumerLock, Job, JobQueue};
//!
//! let queue = JobQueue::open("data/queue.db")?;
//! queue.enqueue(&Job::new("alice"))?;
//!
//! let _lock = ConsumerLock::for_queue(queue.path())?;
//! while let Some(job) = queue.dequeue(Duration::from_secs(1))? {
//!     println!("{}", job.user_id);
//! }
//! ```

pub mod cli;
pub mod config;
mod error;
mod job;
mod lock;
mod queue;

pub use error::QueueError;
pub use job::Job;
pub use lock::ConsumerLock;
pub use queue::JobQueue;

/// Queue database file name inside a store directory
pub const QUEUE_FILE: &str = "queue.db";

/// Default interval between head polls while blocked in `dequeue` (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
