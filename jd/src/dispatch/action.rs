//! Execution side-effect invoked for each released job

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Errors raised by a job action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

/// The unit of work triggered once the dispatch loop releases a job.
///
/// Fire-and-forget from the loop's point of view: a failure is logged and
/// the job is never retried. Implementations receive only the user id.
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn execute(&self, user_id: &str) -> Result<(), ActionError>;
}

/// Default action: append a completion line to the task log
pub struct TaskLogAction {
    log_path: PathBuf,
}

impl TaskLogAction {
    /// Create an action writing to the given log file
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Path of the task log file
    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }
}

#[async_trait]
impl JobAction for TaskLogAction {
    async fn execute(&self, user_id: &str) -> Result<(), ActionError> {
        let line = format!(
            "{}-task completed at-{}\n",
            user_id,
            chrono::Utc::now().timestamp_millis()
        );

        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        info!(user_id, "Task completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_completion_lines() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("task_log.txt");
        let action = TaskLogAction::new(log_path.clone());

        action.execute("alice").await.unwrap();
        action.execute("bob").await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("alice-task completed at-"));
        assert!(lines[1].starts_with("bob-task completed at-"));
    }

    #[tokio::test]
    async fn test_creates_missing_parent_directory() {
        let temp = TempDir::new().unwrap();
        let log_path = temp.path().join("nested").join("task_log.txt");
        let action = TaskLogAction::new(log_path.clone());

        action.execute("alice").await.unwrap();
        assert!(log_path.exists());
    }
}
