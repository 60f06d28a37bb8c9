//! Consumer lock: exactly one dequeuer per queue

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::QueueError;

/// Exclusive advisory lock marking the single process allowed to dequeue.
///
/// Without it, two dispatch loops would each hold a disjoint in-memory
/// throttle map and silently violate the per-user spacing invariant. The
/// lock is released on drop and by the OS when the holder dies, so a
/// crashed consumer never wedges the queue.
#[derive(Debug)]
pub struct ConsumerLock {
    file: File,
    path: PathBuf,
}

impl ConsumerLock {
    /// Lock file path for a queue database at `queue_path`
    pub fn path_for_queue(queue_path: &Path) -> PathBuf {
        queue_path.with_extension("lock")
    }

    /// Acquire the consumer lock for the queue stored at `queue_path`
    pub fn for_queue(queue_path: &Path) -> Result<Self, QueueError> {
        Self::acquire(Self::path_for_queue(queue_path))
    }

    /// Acquire an exclusive lock on the given lock file, recording our PID
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                QueueError::ConsumerActive { path: path.clone() }
            } else {
                QueueError::Io(e)
            }
        })?;

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!(path = %path.display(), "Acquired consumer lock");
        Ok(Self { file, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded by the current holder, if the lock file is readable
    pub fn holder_pid(path: &Path) -> Option<u32> {
        let mut contents = String::new();
        File::open(path).ok()?.read_to_string(&mut contents).ok()?;
        contents.trim().parse().ok()
    }
}

impl Drop for ConsumerLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release consumer lock");
        }
    }
}
