//! Deferred removal of uploaded artifacts.
//!
//! Cleanup is scheduled at submission time with a fixed delay and runs
//! whether or not the job has finished. Removal is idempotent and never
//! fails the caller: the outcome is only reported back for logging.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SchedResult;
use crate::queue::{CleanupTask, Task, TaskQueue};

/// Result of one removal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The file existed and was deleted.
    Removed,
    /// Nothing to delete; already gone.
    NotFound,
    /// Deletion failed. Not retried.
    Failed(String),
}

impl std::fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupOutcome::Removed => write!(f, "File cleaned up successfully"),
            CleanupOutcome::NotFound => write!(f, "File not found"),
            CleanupOutcome::Failed(e) => write!(f, "Cleanup failed: {e}"),
        }
    }
}

/// Queue removal of `artifact_path` after `delay`.
pub async fn schedule_cleanup(
    queue: &dyn TaskQueue,
    artifact_path: &Path,
    delay: Duration,
) -> SchedResult<()> {
    queue
        .enqueue(
            Task::Cleanup(CleanupTask {
                artifact_path: artifact_path.to_path_buf(),
            }),
            delay,
        )
        .await
}

/// Delete `path` if it exists.
pub async fn remove_artifact(path: &Path) -> CleanupOutcome {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed artifact {}", path.display());
            CleanupOutcome::Removed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CleanupOutcome::NotFound,
        Err(e) => {
            warn!("Failed to remove artifact {}: {}", path.display(), e);
            CleanupOutcome::Failed(e.to_string())
        }
    }
}
