//! Core durable queue implementation

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::QueueError;
use crate::job::Job;

/// Durable FIFO queue of pending jobs, backed by a single SQLite table.
///
/// `enqueue` returns only after the insert has committed, so an accepted
/// job survives a crash of every process. `dequeue` removes the head row
/// atomically with returning it; there is no acknowledgment stage, so a
/// crash between a successful dequeue and the completion of the caller's
/// action drops that job (delivery is at-least-once up to that window).
pub struct JobQueue {
    conn: Connection,
    path: PathBuf,
    poll_interval: Duration,
}

impl JobQueue {
    /// Open or create the queue database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        // WAL lets producers insert while the consumer polls; FULL sync
        // makes "enqueue returned" mean "job is on disk".
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        debug!(path = %path.display(), "Opened job queue");
        Ok(Self {
            conn,
            path,
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
        })
    }

    /// Set the interval between head polls used by the blocking `dequeue`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Path of the queue database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a job to the tail. Returns the assigned sequence number once
    /// the row is durably committed.
    pub fn enqueue(&self, job: &Job) -> Result<u64, QueueError> {
        let payload = serde_json::to_string(job)?;
        self.conn
            .execute("INSERT INTO jobs (payload) VALUES (?1)", params![payload])?;
        let seq = self.conn.last_insert_rowid() as u64;
        debug!(job_id = %job.job_id, user_id = %job.user_id, seq, "Enqueued job");
        Ok(seq)
    }

    /// Remove and return the head job, if any, in one atomic statement.
    ///
    /// A row whose payload fails to parse is still consumed, so one bad
    /// record cannot wedge the queue; the error surfaces to the caller.
    pub fn try_dequeue(&self) -> Result<Option<Job>, QueueError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "DELETE FROM jobs WHERE seq = (SELECT MIN(seq) FROM jobs) RETURNING payload",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            None => Ok(None),
            Some(payload) => {
                let job: Job = serde_json::from_str(&payload)?;
                debug!(job_id = %job.job_id, "Dequeued job");
                Ok(Some(job))
            }
        }
    }

    /// Block up to `timeout` waiting for a head element.
    ///
    /// Returns `Ok(None)` when the timeout elapses with an empty queue,
    /// an expected idle condition rather than an error. The wait is a
    /// poll loop; see [`JobQueue::with_poll_interval`].
    pub fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_dequeue()? {
                return Ok(Some(job));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Number of jobs currently pending
    pub fn len(&self) -> Result<u64, QueueError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Check whether the queue has no pending jobs
    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, JobQueue) {
        let temp = TempDir::new().unwrap();
        let queue = JobQueue::open(temp.path().join("queue.db")).unwrap();
        (temp, queue)
    }

    #[test]
    fn test_fifo_order() {
        let (_temp, queue) = open_temp();

        let first = Job::new("alice");
        let second = Job::new("alice");
        let third = Job::new("bob");
        queue.enqueue(&first).unwrap();
        queue.enqueue(&second).unwrap();
        queue.enqueue(&third).unwrap();

        assert_eq!(queue.try_dequeue().unwrap().unwrap().job_id, first.job_id);
        assert_eq!(queue.try_dequeue().unwrap().unwrap().job_id, second.job_id);
        assert_eq!(queue.try_dequeue().unwrap().unwrap().job_id, third.job_id);
        assert_eq!(queue.try_dequeue().unwrap(), None);
    }

    #[test]
    fn test_dequeue_timeout_returns_none() {
        let (_temp, queue) = open_temp();
        let queue = queue.with_poll_interval(Duration::from_millis(5));

        let start = Instant::now();
        let result = queue.dequeue(Duration::from_millis(50)).unwrap();

        assert_eq!(result, None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_jobs_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.db");

        let job = Job::new("alice");
        {
            let queue = JobQueue::open(&path).unwrap();
            queue.enqueue(&job).unwrap();
        }

        let queue = JobQueue::open(&path).unwrap();
        assert_eq!(queue.len().unwrap(), 1);
        assert_eq!(queue.try_dequeue().unwrap().unwrap().job_id, job.job_id);
    }

    #[test]
    fn test_extra_payload_fields_are_ignored() {
        let (_temp, queue) = open_temp();

        queue
            .conn
            .execute(
                "INSERT INTO jobs (payload) VALUES (?1)",
                params![r#"{"job_id":"j-1","user_id":"alice","enqueued_at":7,"shard":"eu-1"}"#],
            )
            .unwrap();

        let job = queue.try_dequeue().unwrap().unwrap();
        assert_eq!(job.job_id, "j-1");
        assert_eq!(job.user_id, "alice");
    }

    #[test]
    fn test_bad_record_does_not_wedge_the_queue() {
        let (_temp, queue) = open_temp();

        queue
            .conn
            .execute("INSERT INTO jobs (payload) VALUES (?1)", params!["not json"])
            .unwrap();
        let good = Job::new("alice");
        queue.enqueue(&good).unwrap();

        assert!(matches!(
            queue.try_dequeue(),
            Err(QueueError::Malformed(_))
        ));
        assert_eq!(queue.try_dequeue().unwrap().unwrap().job_id, good.job_id);
    }

    #[test]
    fn test_len_and_is_empty() {
        let (_temp, queue) = open_temp();

        assert!(queue.is_empty().unwrap());
        queue.enqueue(&Job::new("alice")).unwrap();
        queue.enqueue(&Job::new("bob")).unwrap();
        assert_eq!(queue.len().unwrap(), 2);
        assert!(!queue.is_empty().unwrap());
    }

    #[test]
    fn test_producer_and_consumer_connections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queue.db");

        let consumer = JobQueue::open(&path)
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));

        let producer_path = path.clone();
        let producer = std::thread::spawn(move || {
            let queue = JobQueue::open(&producer_path).unwrap();
            std::thread::sleep(Duration::from_millis(30));
            queue.enqueue(&Job::new("alice")).unwrap();
        });

        let job = consumer.dequeue(Duration::from_secs(2)).unwrap();
        producer.join().unwrap();

        assert_eq!(job.unwrap().user_id, "alice");
    }
}
