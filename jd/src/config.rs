//! JobDaemon configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main JobDaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admission HTTP server configuration
    pub server: ServerConfig,

    /// Per-user dispatch spacing
    pub throttle: ThrottleConfig,

    /// Durable queue tuning
    pub queue: QueueConfig,

    /// Per-user submission rate ceiling
    pub admission: AdmissionConfig,

    /// Worker restart policy
    pub supervisor: SupervisorConfig,

    /// Storage locations
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_addr
            .parse::<SocketAddr>()
            .context(format!("Invalid server.bind-addr: {}", self.server.bind_addr))?;

        if self.server.workers == 0 {
            return Err(eyre::eyre!("server.workers must be at least 1"));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .jobdaemon.yml
        let local_config = PathBuf::from(".jobdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/jobdaemon/jobdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobdaemon").join("jobdaemon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Path of the queue database file
    pub fn queue_path(&self) -> PathBuf {
        self.storage.data_dir.join(jobstore::QUEUE_FILE)
    }

    /// Path of the task completion log written by the default action
    pub fn task_log_path(&self) -> PathBuf {
        self.storage.data_dir.join("task_log.txt")
    }
}

/// Admission HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the submission API listens on
    #[serde(rename = "bind-addr")]
    pub bind_addr: String,

    /// Number of admission worker tasks sharing the listener
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            workers: 2,
        }
    }
}

/// Per-user dispatch spacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum time between two dispatches for the same user (ms)
    #[serde(rename = "min-spacing-ms")]
    pub min_spacing_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { min_spacing_ms: 1000 }
    }
}

impl ThrottleConfig {
    /// Minimum spacing as a Duration
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}

/// Durable queue tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long one dequeue call blocks before the loop re-checks shutdown (ms)
    #[serde(rename = "dequeue-timeout-ms")]
    pub dequeue_timeout_ms: u64,

    /// Interval between head polls while blocked in dequeue (ms)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: 1000,
            poll_interval_ms: jobstore::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl QueueConfig {
    /// Dequeue timeout as a Duration
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Per-user submission rate ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum submissions per user per window
    #[serde(rename = "max-requests")]
    pub max_requests: usize,

    /// Window length in seconds
    #[serde(rename = "window-secs")]
    pub window_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_secs: 60,
        }
    }
}

impl AdmissionConfig {
    /// Window length as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Worker restart policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Pause between a worker's death and its respawn (ms). Zero restarts
    /// immediately, with no ceiling on the restart count.
    #[serde(rename = "restart-delay-ms")]
    pub restart_delay_ms: u64,
}

impl SupervisorConfig {
    /// Restart delay as a Duration
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the queue database, lock file, and task log
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/jobdaemon on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("jobdaemon"))
            .unwrap_or_else(|| PathBuf::from(".jobdaemon"));

        Self { data_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.throttle.min_spacing_ms, 1000);
        assert_eq!(config.admission.max_requests, 20);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.supervisor.restart_delay_ms, 0);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
server:
  bind-addr: 127.0.0.1:8080
  workers: 4

throttle:
  min-spacing-ms: 500

queue:
  dequeue-timeout-ms: 2000
  poll-interval-ms: 25

admission:
  max-requests: 10
  window-secs: 30

supervisor:
  restart-delay-ms: 100
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.throttle.min_spacing(), Duration::from_millis(500));
        assert_eq!(config.queue.dequeue_timeout(), Duration::from_millis(2000));
        assert_eq!(config.queue.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.admission.max_requests, 10);
        assert_eq!(config.admission.window(), Duration::from_secs(30));
        assert_eq!(config.supervisor.restart_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
throttle:
  min-spacing-ms: 250
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.throttle.min_spacing_ms, 250);

        // Defaults for unspecified
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.admission.max_requests, 20);
    }

    #[test]
    fn test_validate_rejects_bad_addr() {
        let config = Config {
            server: ServerConfig {
                bind_addr: "not-an-addr".to_string(),
                workers: 2,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            server: ServerConfig {
                bind_addr: "127.0.0.1:3000".to_string(),
                workers: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            storage: StorageConfig {
                data_dir: PathBuf::from("/var/lib/jobdaemon"),
            },
            ..Default::default()
        };
        assert_eq!(config.queue_path(), PathBuf::from("/var/lib/jobdaemon/queue.db"));
        assert_eq!(
            config.task_log_path(),
            PathBuf::from("/var/lib/jobdaemon/task_log.txt")
        );
    }
}
