//! JobDaemon - durable job queue daemon with per-user dispatch throttling
//!
//! JobDaemon accepts job submissions over HTTP, persists them in a durable
//! FIFO queue (the `jobstore` crate), and releases them one at a time
//! through a dispatch loop that keeps consecutive jobs for the same user
//! at least `min-spacing` apart. Users never delay each other: a backlog
//! for one user leaves every other user's dispatch timing untouched.
//!
//! # Architecture
//!
//! ```text
//! admission workers (N accept loops, one shared socket)
//!         │ enqueue
//!         ▼
//! jobstore::JobQueue (SQLite, survives restarts)
//!         │ dequeue (single consumer, file-locked)
//!         ▼
//! DispatchLoop ── owns ──▶ Throttle (per-user last-dispatch map)
//!         │ execute
//!         ▼
//! JobAction (task log append)
//! ```
//!
//! The [`Supervisor`] restarts dead admission workers and polls the
//! dispatch loop exactly once per daemon lifetime; a
//! [`jobstore::ConsumerLock`] on the queue guarantees at most one dispatch
//! loop across processes. Throttle history is in-memory only and resets on
//! every daemon start.
//!
//! # Modules
//!
//! - [`admission`] - HTTP submission endpoint and per-user rate ceiling
//! - [`dispatch`] - throttle state, dispatch loop, job actions
//! - [`queue`] - async client interface over the blocking store
//! - [`supervisor`] - worker restart policy and the single dispatch slot
//! - [`daemon`] - PID file management and process control
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod admission;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod queue;
pub mod supervisor;

// Re-export commonly used types
pub use admission::{AdmissionState, RateDecision, RateLimiter};
pub use config::Config;
pub use daemon::{DaemonManager, DaemonStatus};
pub use dispatch::{
    ActionError, DispatchConfig, DispatchLoop, DispatchStats, JobAction, TaskLogAction, Throttle,
};
pub use queue::{QueueClient, QueueHandle};
pub use supervisor::{RestartPolicy, Supervisor};

// Store types callers commonly touch
pub use jobstore::{ConsumerLock, Job, JobQueue, QueueError};
