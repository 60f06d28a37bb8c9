//! CLI argument parsing for jobstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobstore")]
#[command(author, version, about = "Durable FIFO job queue", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enqueue one or more jobs for a user
    Enqueue {
        /// User identifier the jobs are throttled under
        #[arg(required = true)]
        user_id: String,

        /// Number of jobs to enqueue
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Remove and print the head job
    Pop {
        /// How long to wait for a job before giving up (ms)
        #[arg(short, long, default_value = "0")]
        timeout_ms: u64,
    },

    /// Show queue statistics
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::parse_from(["jobstore", "enqueue", "alice"]);
        if let Command::Enqueue { user_id, count } = cli.command {
            assert_eq!(user_id, "alice");
            assert_eq!(count, 1);
        } else {
            panic!("Expected Enqueue command");
        }
    }

    #[test]
    fn test_parse_enqueue_count() {
        let cli = Cli::parse_from(["jobstore", "enqueue", "alice", "-n", "5"]);
        assert!(matches!(cli.command, Command::Enqueue { count: 5, .. }));
    }

    #[test]
    fn test_parse_pop_with_timeout() {
        let cli = Cli::parse_from(["jobstore", "pop", "--timeout-ms", "1000"]);
        assert!(matches!(cli.command, Command::Pop { timeout_ms: 1000 }));
    }

    #[test]
    fn test_parse_stats() {
        let cli = Cli::parse_from(["jobstore", "stats"]);
        assert!(matches!(cli.command, Command::Stats));
    }
}
