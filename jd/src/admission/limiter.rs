//! Per-user submission rate ceiling (sliding window)

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Under the ceiling; the request was counted
    Allowed,

    /// Over the ceiling; a slot frees up after `retry_after`
    Limited { retry_after: Duration },
}

/// Sliding-window request ceiling, tracked independently per user.
///
/// Purely an admission-side policy: it knows nothing about the dispatch
/// throttle and shares no state with it.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Allow up to `max_requests` per user within each `window`
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// The configured per-window ceiling
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// The configured window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check (and count) one submission for `user_id`
    pub async fn check(&self, user_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let times = requests.entry(user_id.to_string()).or_default();

        // Prune request times that fell out of the window
        if let Some(window_start) = now.checked_sub(self.window) {
            while times.front().is_some_and(|&t| t <= window_start) {
                times.pop_front();
            }
        }

        if times.len() >= self.max_requests {
            let retry_after = times
                .front()
                .map(|&oldest| (oldest + self.window) - now)
                .unwrap_or(self.window);
            debug!(user_id, retry_after_ms = retry_after.as_millis() as u64, "Rate limited");
            return RateDecision::Limited { retry_after };
        }

        times.push_back(now);
        RateDecision::Allowed
    }
}
