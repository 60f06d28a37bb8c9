//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// JobDaemon - throttled job dispatch daemon
#[derive(Parser)]
#[command(
    name = "jobdaemon",
    about = "Durable job queue daemon with per-user dispatch throttling",
    version,
    after_help = "Logs are written to: ~/.local/share/jobdaemon/logs/jobdaemon.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon in the background
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Enqueue one or more jobs for a user
    Submit {
        /// User identifier the jobs are throttled under
        #[arg(value_name = "USER_ID")]
        user_id: String,

        /// Number of jobs to enqueue
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Show daemon logs
    Logs {
        /// Follow log output (like tail -f)
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Show queue and dispatch statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Internal: Run as daemon process (used by `start`)
    #[command(hide = true)]
    RunDaemon,
}

/// Output format for status/stats commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Default log file location
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobdaemon")
        .join("logs")
        .join("jobdaemon.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["jobdaemon"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_start() {
        let cli = Cli::parse_from(["jobdaemon", "start"]);
        assert!(matches!(cli.command, Some(Command::Start { foreground: false })));
    }

    #[test]
    fn test_cli_parse_start_foreground() {
        let cli = Cli::parse_from(["jobdaemon", "start", "--foreground"]);
        assert!(matches!(cli.command, Some(Command::Start { foreground: true })));
    }

    #[test]
    fn test_cli_parse_stop() {
        let cli = Cli::parse_from(["jobdaemon", "stop"]);
        assert!(matches!(cli.command, Some(Command::Stop)));
    }

    #[test]
    fn test_cli_parse_submit() {
        let cli = Cli::parse_from(["jobdaemon", "submit", "alice", "-n", "3"]);
        if let Some(Command::Submit { user_id, count }) = cli.command {
            assert_eq!(user_id, "alice");
            assert_eq!(count, 3);
        } else {
            panic!("Expected Submit command");
        }
    }

    #[test]
    fn test_cli_parse_stats_json() {
        let cli = Cli::parse_from(["jobdaemon", "stats", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Some(Command::Stats {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["jobdaemon", "-c", "/path/to/config.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }
}
