use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use jobstore::cli::{Cli, Command};
use jobstore::config::Config;
use jobstore::{Job, JobQueue};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("jobstore starting");

    match cli.command {
        Command::Enqueue { user_id, count } => {
            let queue = JobQueue::open(config.queue_file())?;
            for _ in 0..count {
                let job = Job::new(&user_id);
                queue.enqueue(&job)?;
                println!("{} Enqueued job: {}", "✓".green(), job.job_id.cyan());
            }
        }
        Command::Pop { timeout_ms } => {
            let queue = JobQueue::open(config.queue_file())?.with_poll_interval(config.poll_interval());
            match queue.dequeue(Duration::from_millis(timeout_ms))? {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
                None => println!("No job available"),
            }
        }
        Command::Stats => {
            let queue = JobQueue::open(config.queue_file())?;
            println!("Queue: {}", queue.path().display().to_string().cyan());
            println!("  Pending jobs: {}", queue.len()?);
        }
    }

    Ok(())
}
