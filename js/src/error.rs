//! Queue error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the job queue
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store is unreachable or rejected the operation
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// A job row exists but its payload does not parse
    #[error("malformed job record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Another process already holds the consumer lock
    #[error("dispatch consumer already active (lock file: {path})")]
    ConsumerActive { path: PathBuf },

    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl QueueError {
    /// Check if this error means a second consumer tried to attach
    pub fn is_consumer_active(&self) -> bool {
        matches!(self, QueueError::ConsumerActive { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_active_display_names_lock_file() {
        let err = QueueError::ConsumerActive {
            path: PathBuf::from("/tmp/queue.lock"),
        };
        assert!(err.to_string().contains("/tmp/queue.lock"));
        assert!(err.is_consumer_active());
    }

    #[test]
    fn test_sqlite_errors_map_to_unavailable() {
        let err: QueueError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, QueueError::Unavailable(_)));
        assert!(!err.is_consumer_active());
    }

    #[test]
    fn test_malformed_from_serde() {
        let parse_err = serde_json::from_str::<crate::Job>("not json").unwrap_err();
        let err: QueueError = parse_err.into();
        assert!(matches!(err, QueueError::Malformed(_)));
    }
}
