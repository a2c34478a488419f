//! Error handling for the job lifecycle core.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobState;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in the job lifecycle.
#[derive(Error, Debug)]
pub enum SchedError {
    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A job with this id was already created.
    #[error("Job already exists: {0}")]
    JobAlreadyExists(String),

    /// Result requested before the job finished.
    #[error("Result not ready for job {job_id}: job is {state}")]
    ResultNotReady { job_id: String, state: JobState },

    /// Result requested for a failed job.
    #[error("Job {job_id} failed: {error}")]
    JobFailed { job_id: String, error: String },

    /// Attempted a backwards or post-terminal state change.
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    /// The uploaded artifact could not be persisted.
    #[error("Could not store upload at {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The task queue rejected or could not take a task.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// SQLite database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for SchedError {
    fn from(e: rusqlite::Error) -> Self {
        SchedError::DatabaseError(e.to_string())
    }
}
