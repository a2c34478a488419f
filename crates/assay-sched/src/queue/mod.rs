//! Task queue abstraction.
//!
//! The queue carries two kinds of work: analysis tasks and delayed
//! artifact cleanups. It owns delivery semantics: each delivery goes to one
//! worker, and a failed delivery is either retried with backoff or dropped.
//!
//! # Implementations
//!
//! - [`InMemoryQueue`]: single-process queue for tests and `serve` without a
//!   database.
//! - [`SqliteQueue`]: durable queue in a SQLite file, shared by the HTTP
//!   process and separate worker processes.

mod memory;
mod sqlite;

pub use memory::InMemoryQueue;
pub use sqlite::SqliteQueue;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedResult;
use crate::job::JobId;

/// Run the analysis for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeTask {
    pub job_id: JobId,
    pub query: String,
    pub artifact_path: PathBuf,
    pub original_filename: String,
}

/// Remove an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTask {
    pub artifact_path: PathBuf,
}

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    Analyze(AnalyzeTask),
    Cleanup(CleanupTask),
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Analyze(_) => "analyze",
            Task::Cleanup(_) => "cleanup",
        }
    }
}

/// A task handed to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-assigned id, used for ack/nack.
    pub id: u64,
    pub task: Task,
    /// 1 on the first delivery, incremented on each retry.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// What the queue will do with a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Redelivered after `delay` as attempt `next_attempt`.
    Retry { delay: Duration, next_attempt: u32 },
    /// Retries exhausted; the task is dropped.
    GiveUp,
}

/// Point-in-time queue depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Ready to be dequeued now.
    pub ready: usize,
    /// Waiting for a countdown or retry backoff.
    pub scheduled: usize,
    /// Dequeued and not yet acknowledged.
    pub in_flight: usize,
}

/// Queue backend trait.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task that becomes visible after `delay`.
    async fn enqueue(&self, task: Task, delay: Duration) -> SchedResult<()>;

    /// Claim the oldest ready task, if any. Never blocks waiting for work.
    async fn dequeue(&self) -> SchedResult<Option<Delivery>>;

    /// Mark a delivery as done.
    async fn ack(&self, delivery: &Delivery) -> SchedResult<()>;

    /// Report a failed delivery; the queue decides whether to retry.
    async fn nack(&self, delivery: &Delivery, error: &str) -> SchedResult<RetryDecision>;

    /// Current depth.
    async fn stats(&self) -> SchedResult<QueueStats>;

    /// Add a task that is ready immediately.
    async fn push(&self, task: Task) -> SchedResult<()> {
        self.enqueue(task, Duration::ZERO).await
    }
}
