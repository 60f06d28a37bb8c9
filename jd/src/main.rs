//! JobDaemon - throttled job dispatch daemon
//!
//! CLI entry point for managing the daemon and submitting jobs.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use eyre::{Context, Result};
use tracing::{info, warn};

use jobdaemon::admission::{self, AdmissionState, RateLimiter};
use jobdaemon::cli::{Cli, Command, OutputFormat, get_log_path};
use jobdaemon::config::Config;
use jobdaemon::daemon::DaemonManager;
use jobdaemon::dispatch::{DispatchConfig, DispatchLoop, TaskLogAction};
use jobdaemon::queue::{QueueClient, QueueHandle};
use jobdaemon::supervisor::{RestartPolicy, Supervisor};
use jobstore::{ConsumerLock, Job, JobQueue};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobdaemon")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("jobdaemon.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Start { foreground }) => cmd_start(&config, foreground).await,
        Some(Command::Stop) => cmd_stop().await,
        Some(Command::Status { format }) => cmd_status(&config, format).await,
        Some(Command::Submit { user_id, count }) => cmd_submit(&config, &user_id, count).await,
        Some(Command::Logs { follow, lines }) => cmd_logs(follow, lines).await,
        Some(Command::Stats { format }) => cmd_stats(&config, format).await,
        Some(Command::RunDaemon) => cmd_run_daemon(&config).await,
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

/// Start the daemon
async fn cmd_start(config: &Config, foreground: bool) -> Result<()> {
    let daemon = DaemonManager::new();

    if daemon.is_running() {
        println!("JobDaemon is already running (PID: {})", daemon.running_pid().unwrap());
        return Ok(());
    }

    if foreground {
        println!("Starting JobDaemon in foreground mode...");
        run_daemon(config).await
    } else {
        let pid = daemon.start()?;
        println!("JobDaemon started (PID: {})", pid);
        Ok(())
    }
}

/// Stop the daemon
async fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("JobDaemon is not running");
        return Ok(());
    }

    let pid = daemon.running_pid().unwrap();
    daemon.stop()?;
    println!("JobDaemon stopped (was PID: {})", pid);
    Ok(())
}

/// Show daemon status
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let status = daemon.status();
    let pending = pending_jobs(config)?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "running": status.running,
                "pid": status.pid,
                "pid_file": status.pid_file.to_string_lossy(),
                "pending_jobs": pending,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("JobDaemon Status");
            println!("----------------");
            if status.running {
                println!("Status: {}", "running".green());
                println!("PID: {}", status.pid.unwrap());
            } else {
                println!("Status: {}", "stopped".red());
            }
            println!("PID file: {}", status.pid_file.display());
            match pending {
                Some(count) => println!("Pending jobs: {}", count),
                None => println!("Pending jobs: (no queue yet)"),
            }
        }
    }

    Ok(())
}

/// Enqueue jobs from the command line (every process may produce)
async fn cmd_submit(config: &Config, user_id: &str, count: u32) -> Result<()> {
    if user_id.is_empty() {
        return Err(eyre::eyre!("user_id must not be empty"));
    }

    let queue = JobQueue::open(config.queue_path())?;
    for _ in 0..count {
        let job = Job::new(user_id);
        queue.enqueue(&job)?;
        println!("{} Enqueued job {} for {}", "✓".green(), job.job_id.cyan(), user_id);
    }

    Ok(())
}

/// Show logs
async fn cmd_logs(follow: bool, lines: usize) -> Result<()> {
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        println!("The daemon may not have been started yet.");
        return Ok(());
    }

    if follow {
        println!("Following log file: {} (Ctrl+C to stop)", log_path.display());
        println!();

        // Use tail -f for following
        let mut child = std::process::Command::new("tail")
            .args(["-f", "-n", &lines.to_string()])
            .arg(&log_path)
            .spawn()
            .context("Failed to run tail -f")?;

        child.wait()?;
    } else {
        // Read last N lines
        let file = fs::File::open(&log_path).context("Failed to open log file")?;
        let reader = BufReader::new(file);
        let all_lines: Vec<String> = reader.lines().map_while(Result::ok).collect();

        let start = if all_lines.len() > lines { all_lines.len() - lines } else { 0 };

        for line in &all_lines[start..] {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Show queue statistics
async fn cmd_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let daemon = DaemonManager::new();
    let pending = pending_jobs(config)?;
    let lock_path = ConsumerLock::path_for_queue(&config.queue_path());
    let consumer_pid = ConsumerLock::holder_pid(&lock_path);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "queue_path": config.queue_path().to_string_lossy(),
                "pending_jobs": pending,
                "daemon_running": daemon.is_running(),
                "consumer_pid": consumer_pid,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("JobDaemon Statistics");
            println!("--------------------");
            println!("Queue: {}", config.queue_path().display());
            match pending {
                Some(count) => println!("Pending jobs: {}", count),
                None => println!("Pending jobs: (no queue yet)"),
            }
            println!("Daemon running: {}", daemon.is_running());
            if let Some(pid) = consumer_pid {
                println!("Consumer PID: {}", pid);
            }
        }
    }

    Ok(())
}

/// Queue depth, or None if the store has never been created
fn pending_jobs(config: &Config) -> Result<Option<u64>> {
    if !config.queue_path().exists() {
        return Ok(None);
    }
    let queue = JobQueue::open(config.queue_path())?;
    Ok(Some(queue.len()?))
}

/// Run as the daemon process (internal command)
async fn cmd_run_daemon(config: &Config) -> Result<()> {
    let daemon = DaemonManager::new();
    daemon.register_self()?;

    run_daemon(config).await
}

/// Run the daemon main loop
async fn run_daemon(config: &Config) -> Result<()> {
    info!("Daemon starting...");

    config.validate()?;
    fs::create_dir_all(&config.storage.data_dir).context("Failed to create data directory")?;

    // Exactly one dispatch consumer across processes: without this lock,
    // two loops would each hold a disjoint throttle map and silently
    // violate the per-user spacing invariant.
    let consumer_lock =
        ConsumerLock::for_queue(&config.queue_path()).context("Another dispatch consumer appears to be active")?;
    info!(lock = %consumer_lock.path().display(), "Consumer lock acquired");

    let queue = QueueHandle::spawn(config.queue_path(), config.queue.poll_interval())?;
    let queue_client: Arc<dyn QueueClient> = Arc::new(queue);

    // Admission state shared by all workers
    let limiter = RateLimiter::new(config.admission.max_requests, config.admission.window());
    let state = Arc::new(AdmissionState {
        queue: queue_client.clone(),
        limiter,
    });

    // One listening socket, cloned into each admission worker
    let listener = std::net::TcpListener::bind(&config.server.bind_addr)
        .context(format!("Failed to bind {}", config.server.bind_addr))?;
    listener.set_nonblocking(true)?;
    info!(
        addr = %config.server.bind_addr,
        workers = config.server.workers,
        "Admission listener bound"
    );

    let mut supervisor = Supervisor::new(RestartPolicy {
        restart_delay: config.supervisor.restart_delay(),
    });
    for i in 0..config.server.workers {
        let listener = listener.try_clone().context("Failed to clone listener")?;
        let state = state.clone();
        supervisor.register(format!("admission-{}", i), move || {
            let listener = listener.try_clone();
            let state = state.clone();
            async move {
                let listener = tokio::net::TcpListener::from_std(listener?)?;
                axum::serve(listener, admission::router(state)).await?;
                Ok(())
            }
        });
    }

    let action = Arc::new(TaskLogAction::new(config.task_log_path()));
    let dispatch = DispatchLoop::new(
        queue_client,
        action,
        DispatchConfig {
            dequeue_timeout: config.queue.dequeue_timeout(),
            min_spacing: config.throttle.min_spacing(),
        },
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let supervisor_handle = tokio::spawn(supervisor.run(dispatch.run(shutdown_rx.clone()), shutdown_rx));

    info!("Daemon running. Press Ctrl+C to stop.");

    // Set up signal handlers
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                warn!("SIGINT received");
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On non-Unix, just wait for Ctrl+C
        tokio::signal::ctrl_c().await?;
    }

    let _ = shutdown_tx.send(true);

    info!("Daemon shutting down...");

    let stats = supervisor_handle.await.context("Supervisor task failed")??;
    info!(
        dispatched = stats.dispatched,
        action_failures = stats.action_failures,
        "Daemon stopped"
    );

    drop(consumer_lock);
    Ok(())
}
