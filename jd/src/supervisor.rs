//! Worker supervision and the single dispatch slot
//!
//! Admission workers are restarted on any termination; the dispatch loop
//! is polled exactly once per supervisor lifetime and never respawned,
//! which is what keeps the throttle map single-owner.

use std::time::Duration;

use eyre::Result;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

type WorkerFactory = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How dead workers are brought back
#[derive(Debug, Clone, Default)]
pub struct RestartPolicy {
    /// Pause between a worker's death and its respawn. Zero restarts
    /// immediately; there is no ceiling on the restart count either way.
    pub restart_delay: Duration,
}

struct WorkerSpec {
    name: String,
    factory: WorkerFactory,
}

/// Supervises admission workers and runs the dispatch loop.
///
/// Workers are respawned from their factory on any termination - clean
/// return, error, or panic. The dispatch future is polled directly in the
/// supervisor's own task, so it cannot be duplicated; when it completes
/// (shutdown), the remaining workers are aborted and its result returned.
pub struct Supervisor {
    policy: RestartPolicy,
    workers: Vec<WorkerSpec>,
}

impl Supervisor {
    /// Create a supervisor with the given restart policy
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            workers: Vec::new(),
        }
    }

    /// Register a worker. The factory runs for the initial spawn and once
    /// more after every termination.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.workers.push(WorkerSpec {
            name: name.into(),
            factory: Box::new(move || Box::pin(factory())),
        });
    }

    /// Number of registered workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Run the supervision tree until `dispatch` completes.
    pub async fn run<D, T>(self, dispatch: D, shutdown_rx: watch::Receiver<bool>) -> Result<T>
    where
        D: Future<Output = Result<T>>,
    {
        let mut workers = JoinSet::new();
        for spec in self.workers {
            workers.spawn(supervise_worker(spec, self.policy.clone(), shutdown_rx.clone()));
        }

        // The dispatch loop is polled here, not spawned: it can never be
        // duplicated, and its result is the supervisor's result.
        let result = dispatch.await;

        workers.abort_all();
        while workers.join_next().await.is_some() {}

        result
    }
}

async fn supervise_worker(spec: WorkerSpec, policy: RestartPolicy, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        info!(worker = %spec.name, "Starting worker");
        let mut handle = tokio::spawn((spec.factory)());

        tokio::select! {
            // Any change on the shutdown watch (or its sender dropping)
            // means the daemon is going down
            _ = shutdown_rx.changed() => {
                handle.abort();
                let _ = handle.await;
                break;
            }
            res = &mut handle => match res {
                Ok(Ok(())) => warn!(worker = %spec.name, "Worker exited; restarting"),
                Ok(Err(e)) => error!(worker = %spec.name, error = %e, "Worker failed; restarting"),
                Err(e) if e.is_panic() => error!(worker = %spec.name, "Worker panicked; restarting"),
                Err(_) => break,
            },
        }

        if !policy.restart_delay.is_zero() {
            tokio::time::sleep(policy.restart_delay).await;
        }
    }

    info!(worker = %spec.name, "Worker supervision stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_failing_worker_is_restarted_repeatedly() {
        let spawns = Arc::new(AtomicUsize::new(0));

        let mut supervisor = Supervisor::new(RestartPolicy {
            restart_delay: Duration::from_millis(100),
        });
        let counter = spawns.clone();
        supervisor.register("flaky", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(eyre::eyre!("induced crash"))
            }
        });

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatch = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        };
        supervisor.run(dispatch, shutdown_rx).await.unwrap();

        // ~10 restart cycles fit in one second at 100ms delay
        assert!(spawns.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_is_also_restarted() {
        let spawns = Arc::new(AtomicUsize::new(0));

        let mut supervisor = Supervisor::new(RestartPolicy {
            restart_delay: Duration::from_millis(100),
        });
        let counter = spawns.clone();
        supervisor.register("short-lived", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatch = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        };
        supervisor.run(dispatch, shutdown_rx).await.unwrap();

        assert!(spawns.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_result_is_returned() {
        let supervisor = Supervisor::new(RestartPolicy::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = supervisor.run(async { Ok(42u64) }, shutdown_rx).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_completion_tears_down_pending_workers() {
        let mut supervisor = Supervisor::new(RestartPolicy::default());
        supervisor.register("sleeper", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatch = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        };

        // Must complete despite the worker sleeping for an hour
        tokio::time::timeout(Duration::from_secs(10), supervisor.run(dispatch, shutdown_rx))
            .await
            .expect("supervisor did not stop with its workers pending")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_worker_supervision() {
        let spawns = Arc::new(AtomicUsize::new(0));

        let mut supervisor = Supervisor::new(RestartPolicy::default());
        let counter = spawns.clone();
        supervisor.register("worker", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatch_rx = shutdown_rx.clone();
        let dispatch = async move {
            let mut rx = dispatch_rx;
            let _ = rx.changed().await;
            Ok(())
        };

        let run = supervisor.run(dispatch, shutdown_rx);
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("supervisor stopped before shutdown"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }

        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        // The worker was spawned once and never restarted after shutdown
        assert_eq!(spawns.load(Ordering::SeqCst), 1);
    }
}
