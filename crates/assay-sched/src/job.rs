//! Job types for the analysis queue.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SchedError, SchedResult};

/// Unique identifier for an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse lifecycle state, ordered `Pending < Processing < {Success, Failure}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Processing,
    Success,
    Failure,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Success,
        JobState::Failure,
    ];

    /// Position in the lifecycle. Both terminal states share the top rank.
    pub fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Processing => 1,
            JobState::Success | JobState::Failure => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Whether a job in `self` may move to `next`.
    ///
    /// Processing may be re-entered to report progress; nothing leaves a
    /// terminal state and nothing returns to Pending.
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Processing, JobState::Processing) => true,
            (from, to) => !from.is_terminal() && to.rank() > from.rank(),
        }
    }

    /// Wire name, e.g. `"PENDING"`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Processing => "PROCESSING",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub query: String,
    #[serde(rename = "analysis")]
    pub analysis_text: String,
    #[serde(rename = "file_processed")]
    pub processed_filename: String,
    #[serde(rename = "task_id")]
    pub job_id: JobId,
}

/// Detailed status. Result and error data live inside the terminal variants,
/// so a job can never carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending,

    /// Claimed by a worker.
    Processing { progress: u8, message: String },

    /// Analysis finished.
    Success { result: AnalysisResult },

    /// Analysis failed for good.
    Failure { error: String },
}

impl JobStatus {
    /// Processing status with `progress` clamped to 0..=100.
    pub fn processing(progress: u8, message: impl Into<String>) -> Self {
        JobStatus::Processing {
            progress: progress.min(100),
            message: message.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        JobStatus::Failure {
            error: error.into(),
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobStatus::Pending => JobState::Pending,
            JobStatus::Processing { .. } => JobState::Processing,
            JobStatus::Success { .. } => JobState::Success,
            JobStatus::Failure { .. } => JobState::Failure,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Progress as seen by clients: fixed for every state but Processing.
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Processing { progress, .. } => *progress,
            JobStatus::Success { .. } => 100,
            JobStatus::Pending | JobStatus::Failure { .. } => 0,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            JobStatus::Success { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobStatus::Failure { error } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Processing { progress, message } => {
                write!(f, "Processing ({progress}%): {message}")
            }
            JobStatus::Success { .. } => write!(f, "Success"),
            JobStatus::Failure { error } => write!(f, "Failure: {error}"),
        }
    }
}

/// What the submitter handed over. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    pub query: String,
    pub artifact_path: PathBuf,
    pub original_filename: String,
}

/// One unit of queued analysis work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub input: JobInput,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(id: JobId, input: JobInput) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            input,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.status.state()
    }

    /// Move to `next`, rejecting anything that is not a forward step.
    pub fn transition(&mut self, next: JobStatus) -> SchedResult<()> {
        let from = self.state();
        let to = next.state();
        if !from.can_transition_to(to) {
            return Err(SchedError::InvalidTransition {
                job_id: self.id.to_string(),
                from,
                to,
            });
        }

        let now = Utc::now();
        if to == JobState::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only these states (all if `None`).
    pub states: Option<Vec<JobState>>,
    /// Maximum number of jobs to return.
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_state(mut self, state: JobState) -> Self {
        self.states.get_or_insert_with(Vec::new).push(state);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.states
            .as_ref()
            .is_none_or(|states| states.contains(&job.state()))
    }
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub failure: usize,
}

impl StateCounts {
    pub fn add(&mut self, state: JobState, n: usize) {
        match state {
            JobState::Pending => self.pending += n,
            JobState::Processing => self.processing += n,
            JobState::Success => self.success += n,
            JobState::Failure => self.failure += n,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.success + self.failure
    }
}
