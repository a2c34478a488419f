//! Assay job lifecycle core.
//!
//! Everything between "a report was uploaded" and "here is the analysis":
//!
//! ```text
//!  SubmissionGateway ──create──→ JobStore ←──transition── WorkerPool
//!        │                          ↑                        ↑  │
//!        └──enqueue(Analyze)──→ TaskQueue ──dequeue──────────┘  │
//!        └──enqueue(Cleanup, delay)─┘                           ↓
//!                                   │                       Analyzer
//!  status::job_status / job_result ─┘ (reads JobStore only)
//! ```
//!
//! - [`JobStore`]: durable job records ([`SqliteStore`], [`JsonStore`])
//! - [`TaskQueue`]: delivery of analysis and cleanup tasks
//!   ([`InMemoryQueue`], [`SqliteQueue`])
//! - [`WorkerPool`] / [`WorkerExecutor`]: run analyses, record progress
//! - [`SubmissionGateway`]: accept uploads without waiting on analysis
//! - [`status`]: client-facing status and result translation
//! - [`cleanup`]: idempotent artifact removal
//!
//! Every component takes its collaborators and configuration at
//! construction; nothing is registered globally.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod persistence;
pub mod queue;
pub mod status;
pub mod worker;

pub use cleanup::{CleanupOutcome, remove_artifact, schedule_cleanup};
pub use config::{GatewayConfig, QueueConfig, WorkerConfig};
pub use error::{SchedError, SchedResult};
pub use gateway::{SubmissionGateway, Submission, Upload};
pub use job::{
    AnalysisResult, Job, JobFilter, JobId, JobInput, JobState, JobStatus, StateCounts,
};
pub use persistence::{JobStore, JsonStore, SqliteStore};
pub use queue::{
    AnalyzeTask, CleanupTask, Delivery, InMemoryQueue, QueueStats, RetryDecision, SqliteQueue,
    Task, TaskQueue,
};
pub use status::{StatusReport, job_result, job_status};
pub use worker::{PoolStats, WorkerExecutor, WorkerPool, WorkerStats};
