//! Per-user dispatch spacing

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks the release time of the most recent job per user and computes
/// the wait needed to keep consecutive releases for one user at least
/// `min_spacing` apart.
///
/// Owned by value by the dispatch loop - there is no shared handle to this
/// state, so the single-owner requirement is an ownership fact rather than
/// a runtime assumption. History starts empty on every process start;
/// spacing does not survive a restart.
#[derive(Debug)]
pub struct Throttle {
    min_spacing: Duration,
    last_release: HashMap<String, Instant>,
}

impl Throttle {
    /// Create a throttle enforcing the given minimum spacing
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_release: HashMap::new(),
        }
    }

    /// The configured minimum spacing
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Time the caller must wait before releasing a job for `user_id`.
    ///
    /// A user with no recorded release waits nothing. The recorded release
    /// may lie in the future (a backlogged user whose previous job is
    /// still waiting out its spacing); the wait then extends past a full
    /// `min_spacing`, keeping chained releases exactly spaced.
    pub fn time_to_wait(&self, user_id: &str, now: Instant) -> Duration {
        match self.last_release.get(user_id) {
            None => Duration::ZERO,
            Some(&last) => (last + self.min_spacing).saturating_duration_since(now),
        }
    }

    /// Record that a job for `user_id` is released at `release_at`.
    ///
    /// Called exactly once per job, by the single dispatch loop, so
    /// back-to-back dequeues for the same user compose correctly.
    pub fn record_dispatch(&mut self, user_id: &str, release_at: Instant) {
        self.last_release.insert(user_id.to_string(), release_at);
    }

    /// Number of users with recorded dispatch history
    pub fn tracked_users(&self) -> usize {
        self.last_release.len()
    }
}
