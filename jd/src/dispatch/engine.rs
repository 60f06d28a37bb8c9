//! Dispatch loop: the single consumer that releases jobs under throttling

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use jobstore::Job;

use super::action::JobAction;
use super::throttle::Throttle;
use crate::queue::QueueClient;

/// Configuration for the dispatch loop
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long one dequeue call blocks before the loop re-checks shutdown
    pub dequeue_timeout: Duration,

    /// Minimum spacing between two releases for the same user
    pub min_spacing: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_millis(1000),
            min_spacing: Duration::from_millis(1000),
        }
    }
}

/// Counters accumulated by the dispatch loop.
///
/// `dispatched` counts jobs whose action completed; `action_failures`
/// counts jobs whose action errored (released but never retried).
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub action_failures: u64,
    pub queue_errors: u64,
    pub idle_wakeups: u64,
}

/// The single consumer of the durable queue.
///
/// The loop alternates between blocking in dequeue (idle) and making one
/// dispatch decision: compute the user's wait, record the release time,
/// hand the job to a timer task that sleeps out the wait and triggers the
/// action. Every decision - and every throttle mutation - happens inside
/// this one loop, so the owned throttle map needs no locking; only the
/// fire-and-forget actions themselves run concurrently. One user's spacing
/// wait therefore never delays jobs queued behind it for other users.
pub struct DispatchLoop {
    queue: Arc<dyn QueueClient>,
    action: Arc<dyn JobAction>,
    throttle: Throttle,
    config: DispatchConfig,
    stats: DispatchStats,
}

impl DispatchLoop {
    /// Create a dispatch loop with fresh (empty) throttle history
    pub fn new(queue: Arc<dyn QueueClient>, action: Arc<dyn JobAction>, config: DispatchConfig) -> Self {
        let throttle = Throttle::new(config.min_spacing);
        Self {
            queue,
            action,
            throttle,
            config,
            stats: DispatchStats::default(),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Run until `shutdown_rx` flips to true.
    ///
    /// Per-job failures are logged and never terminate the loop: one bad
    /// job must not block the next one, including the next job for the
    /// same user. On shutdown, already-released jobs are allowed to fire
    /// before the final stats are reported; jobs still in the durable
    /// queue stay there for the next consumer.
    pub async fn run(mut self, shutdown_rx: watch::Receiver<bool>) -> Result<DispatchStats> {
        info!(
            min_spacing_ms = self.config.min_spacing.as_millis() as u64,
            dequeue_timeout_ms = self.config.dequeue_timeout.as_millis() as u64,
            "Dispatch loop started"
        );

        let mut in_flight: JoinSet<bool> = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Reap finished actions without blocking
            while let Some(outcome) = in_flight.try_join_next() {
                self.tally(outcome);
            }

            match self.queue.dequeue(self.config.dequeue_timeout).await {
                Ok(Some(job)) => self.dispatch(job, &mut in_flight),
                Ok(None) => {
                    // Expected idle condition; re-block without touching state
                    self.stats.idle_wakeups += 1;
                    debug!("Dequeue timed out with empty queue");
                }
                Err(e) => {
                    self.stats.queue_errors += 1;
                    error!(error = %e, "Dequeue failed; retrying after timeout interval");
                    tokio::time::sleep(self.config.dequeue_timeout).await;
                }
            }
        }

        // Let scheduled releases fire before reporting final counts
        while let Some(outcome) = in_flight.join_next().await {
            self.tally(outcome);
        }

        info!(
            dispatched = self.stats.dispatched,
            action_failures = self.stats.action_failures,
            "Dispatch loop stopped"
        );
        Ok(self.stats)
    }

    /// Make the dispatch decision for one job and schedule its release
    fn dispatch(&mut self, job: Job, in_flight: &mut JoinSet<bool>) {
        let now = Instant::now();
        let wait = self.throttle.time_to_wait(&job.user_id, now);
        let release_at = now + wait;

        // Record the scheduled release before handing off, so the next job
        // for this user spaces itself from it even while this one is still
        // waiting.
        self.throttle.record_dispatch(&job.user_id, release_at);

        let action = self.action.clone();
        in_flight.spawn(async move {
            if !wait.is_zero() {
                debug!(
                    job_id = %job.job_id,
                    user_id = %job.user_id,
                    wait_ms = wait.as_millis() as u64,
                    "Throttling dispatch"
                );
                tokio::time::sleep_until(release_at).await;
            }

            match action.execute(&job.user_id).await {
                Ok(()) => {
                    info!(job_id = %job.job_id, user_id = %job.user_id, "Processed job");
                    true
                }
                Err(e) => {
                    warn!(
                        job_id = %job.job_id,
                        user_id = %job.user_id,
                        error = %e,
                        "Action failed; job is not retried"
                    );
                    false
                }
            }
        });
    }

    fn tally(&mut self, outcome: Result<bool, tokio::task::JoinError>) {
        match outcome {
            Ok(true) => self.stats.dispatched += 1,
            Ok(false) => self.stats.action_failures += 1,
            Err(e) => {
                self.stats.action_failures += 1;
                error!(error = %e, "Action task failed");
            }
        }
    }
}
