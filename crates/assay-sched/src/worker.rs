//! Worker executor and pool.
//!
//! The [`WorkerExecutor`] runs one analysis and records its progress in the
//! job store. The [`WorkerPool`] runs `concurrency` tokio tasks that pull
//! deliveries from the queue, dispatch them, and acknowledge or fail them.
//!
//! Progress written for each analysis:
//!
//! ```text
//! PENDING → PROCESSING(25) → [analyzer] → PROCESSING(90) → SUCCESS
//!                                 └── error ──→ FAILURE   (queue gave up)
//!                                         └──→ PROCESSING (queue will retry)
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use assay_agent::{AnalysisRequest, Analyzer};
use futures::FutureExt;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cleanup::remove_artifact;
use crate::config::WorkerConfig;
use crate::error::{SchedError, SchedResult};
use crate::job::{AnalysisResult, JobId, JobStatus};
use crate::persistence::JobStore;
use crate::queue::{AnalyzeTask, Delivery, RetryDecision, Task, TaskQueue};

pub const STARTED_PROGRESS: u8 = 25;
pub const STARTED_MESSAGE: &str = "Processing report...";
pub const FORMATTING_PROGRESS: u8 = 90;
pub const FORMATTING_MESSAGE: &str = "Analysis complete, formatting results...";

/// How one analysis attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Succeeded(AnalysisResult),
    /// The analyzer failed; the caller decides between retry and failure.
    Failed(String),
    /// The job is unknown or already finished; nothing was run.
    Skipped(String),
}

/// Runs analyses and writes their state transitions.
pub struct WorkerExecutor {
    store: Arc<dyn JobStore>,
    analyzer: Arc<dyn Analyzer>,
}

impl WorkerExecutor {
    pub fn new(store: Arc<dyn JobStore>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { store, analyzer }
    }

    pub fn analyzer_name(&self) -> &str {
        self.analyzer.name()
    }

    /// Run the analysis for `task`, recording progress and, on success, the
    /// result. Failures are returned to the caller unrecorded.
    pub async fn execute(&self, task: &AnalyzeTask) -> Execution {
        let job_id = task.job_id;

        match self
            .store
            .transition(&job_id, JobStatus::processing(STARTED_PROGRESS, STARTED_MESSAGE))
            .await
        {
            Ok(_) => {}
            Err(e @ (SchedError::JobNotFound(_) | SchedError::InvalidTransition { .. })) => {
                warn!(%job_id, "Skipping analysis: {}", e);
                return Execution::Skipped(e.to_string());
            }
            Err(e) => error!(%job_id, "Failed to record start: {}", e),
        }

        let request = AnalysisRequest::new(task.query.clone(), task.artifact_path.clone());
        // A panicking analyzer fails the job instead of taking the worker down.
        let output = match AssertUnwindSafe(self.analyzer.analyze(&request))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Execution::Failed(e.to_string()),
            Err(panic) => {
                let message = format!("analyzer panicked: {}", panic_message(panic.as_ref()));
                error!(%job_id, "{}", message);
                return Execution::Failed(message);
            }
        };

        self.record(
            &job_id,
            JobStatus::processing(FORMATTING_PROGRESS, FORMATTING_MESSAGE),
        )
        .await;

        let result = AnalysisResult {
            query: task.query.clone(),
            analysis_text: output.text,
            processed_filename: task.original_filename.clone(),
            job_id,
        };
        self.record(
            &job_id,
            JobStatus::Success {
                result: result.clone(),
            },
        )
        .await;

        Execution::Succeeded(result)
    }

    /// Record a failed attempt according to the queue's decision.
    pub async fn record_failure(&self, job_id: &JobId, error: &str, decision: RetryDecision) {
        let status = match decision {
            RetryDecision::GiveUp => JobStatus::failure(format!("Error: {error}")),
            RetryDecision::Retry { next_attempt, .. } => JobStatus::processing(
                STARTED_PROGRESS,
                format!("Retrying after error (attempt {next_attempt}): {error}"),
            ),
        };
        self.record(job_id, status).await;
    }

    async fn record(&self, job_id: &JobId, status: JobStatus) {
        let state = status.state();
        if let Err(e) = self.store.transition(job_id, status).await {
            error!(%job_id, "Failed to record {}: {}", state, e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Counters for one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker: String,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cleanups: u64,
    /// Job currently being analysed.
    pub active: Option<JobId>,
}

/// Shared per-worker counters, readable while the pool runs.
#[derive(Debug, Default)]
pub struct PoolStats {
    workers: RwLock<FxHashMap<String, WorkerStats>>,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// All workers, ordered by name.
    pub async fn snapshot(&self) -> Vec<WorkerStats> {
        let workers = self.workers.read().await;
        let mut stats: Vec<WorkerStats> = workers.values().cloned().collect();
        stats.sort_by(|a, b| a.worker.cmp(&b.worker));
        stats
    }

    /// Jobs being analysed right now.
    pub async fn active_jobs(&self) -> Vec<JobId> {
        self.snapshot()
            .await
            .into_iter()
            .filter_map(|w| w.active)
            .collect()
    }

    async fn register(&self, worker: &str) {
        self.workers
            .write()
            .await
            .entry(worker.to_string())
            .or_insert_with(|| WorkerStats {
                worker: worker.to_string(),
                ..WorkerStats::default()
            });
    }

    async fn update(&self, worker: &str, f: impl FnOnce(&mut WorkerStats)) {
        let mut workers = self.workers.write().await;
        let stats = workers
            .entry(worker.to_string())
            .or_insert_with(|| WorkerStats {
                worker: worker.to_string(),
                ..WorkerStats::default()
            });
        f(stats);
    }
}

/// A set of workers sharing one queue and one store.
#[derive(Clone)]
pub struct WorkerPool {
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    executor: Arc<WorkerExecutor>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            config,
            queue,
            executor: Arc::new(WorkerExecutor::new(store, analyzer)),
            stats: Arc::new(PoolStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    pub fn worker_names(&self) -> Vec<String> {
        (0..self.config.concurrency.max(1))
            .map(|i| format!("{}-{}", self.config.name_prefix, i + 1))
            .collect()
    }

    /// Start the workers. They stop once `shutdown` turns `true` or its
    /// sender is dropped, after finishing the task in hand.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            workers = self.config.concurrency.max(1),
            analyzer = self.executor.analyzer_name(),
            "Starting worker pool"
        );

        self.worker_names()
            .into_iter()
            .map(|name| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(name, shutdown).await })
            })
            .collect()
    }

    /// Wait for spawned workers to exit.
    pub async fn join(handles: Vec<JoinHandle<()>>) {
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }
    }

    async fn run_worker(&self, name: String, mut shutdown: watch::Receiver<bool>) {
        self.stats.register(&name).await;
        debug!(worker = %name, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once(&name).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!(worker = %name, "Queue error: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(worker = %name, "Worker stopped");
    }

    /// Take one delivery and handle it. Returns `false` if the queue was
    /// empty.
    pub async fn run_once(&self, worker: &str) -> SchedResult<bool> {
        let Some(delivery) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        match &delivery.task {
            Task::Analyze(task) => self.handle_analyze(worker, &delivery, task).await?,
            Task::Cleanup(task) => {
                let outcome = remove_artifact(&task.artifact_path).await;
                info!(worker, path = %task.artifact_path.display(), "{}", outcome);
                self.stats.update(worker, |s| s.cleanups += 1).await;
                self.queue.ack(&delivery).await?;
            }
        }
        Ok(true)
    }

    async fn handle_analyze(
        &self,
        worker: &str,
        delivery: &Delivery,
        task: &AnalyzeTask,
    ) -> SchedResult<()> {
        let job_id = task.job_id;
        info!(worker, %job_id, attempt = delivery.attempt, "Analysing {}", task.original_filename);
        self.stats.update(worker, |s| s.active = Some(job_id)).await;

        let execution = self.executor.execute(task).await;

        self.stats
            .update(worker, |s| {
                s.active = None;
                match &execution {
                    Execution::Succeeded(_) => {
                        s.processed += 1;
                        s.succeeded += 1;
                    }
                    Execution::Failed(_) => {
                        s.processed += 1;
                        s.failed += 1;
                    }
                    Execution::Skipped(_) => {}
                }
            })
            .await;

        match execution {
            Execution::Succeeded(_) => {
                info!(worker, %job_id, "Analysis completed");
                self.queue.ack(delivery).await
            }
            Execution::Skipped(_) => self.queue.ack(delivery).await,
            Execution::Failed(error) => {
                warn!(worker, %job_id, "Analysis failed: {}", error);
                let decision = match self.queue.nack(delivery, &error).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        error!(%job_id, "Could not report failed delivery: {}", e);
                        RetryDecision::GiveUp
                    }
                };
                self.executor
                    .record_failure(&job_id, &error, decision)
                    .await;
                Ok(())
            }
        }
    }
}
