//! Job record and its wire format

use serde::{Deserialize, Serialize};

/// One unit of requested work, tagged with the submitting user.
///
/// Immutable once enqueued. The wire format is a JSON record carrying
/// exactly these three fields; producers may attach extra fields, which
/// consumers ignore for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Globally unique identifier, assigned at enqueue time
    pub job_id: String,

    /// Opaque key identifying the throttling scope. Never empty.
    pub user_id: String,

    /// Wall-clock milliseconds at admission time
    pub enqueued_at: i64,
}

impl Job {
    /// Create a job for `user_id`, stamped with a fresh ID and the current time
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            job_id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            enqueued_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
