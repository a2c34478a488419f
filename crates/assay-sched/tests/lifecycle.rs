//! End-to-end job lifecycle: gateway → queue → worker pool → status.

use std::sync::Arc;
use std::time::Duration;

use assay_agent::{AgentError, AgentResult, AnalysisOutput, AnalysisRequest, Analyzer};
use assay_sched::{
    GatewayConfig, InMemoryQueue, JobId, JobState, JobStore, SchedError, SqliteQueue, SqliteStore,
    SubmissionGateway, TaskQueue, Upload, WorkerConfig, WorkerPool, job_result, job_status,
    remove_artifact,
};
use async_trait::async_trait;
use tokio::sync::{Notify, watch};

/// Blocks every analysis until released.
struct GatedAnalyzer {
    gate: Arc<Notify>,
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    fn name(&self) -> &str {
        "gated"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> AgentResult<AnalysisOutput> {
        self.gate.notified().await;
        let bytes = tokio::fs::read(request.path())
            .await
            .map_err(|source| AgentError::FileUnreadable {
                path: request.path().to_path_buf(),
                source,
            })?;
        Ok(AnalysisOutput::new(format!(
            "{} bytes read for '{}'",
            bytes.len(),
            request.query
        )))
    }
}

struct BrokenAnalyzer;

#[async_trait]
impl Analyzer for BrokenAnalyzer {
    fn name(&self) -> &str {
        "broken"
    }

    async fn analyze(&self, _request: &AnalysisRequest) -> AgentResult<AnalysisOutput> {
        Err(AgentError::Failed("LLM quota exceeded".into()))
    }
}

fn upload(query: &str) -> Upload {
    Upload {
        bytes: b"Glucose 5.4 mmol/L\nCholesterol 6.1 mmol/L".to_vec(),
        filename: "labs.pdf".into(),
        query: Some(query.into()),
    }
}

fn fast_workers() -> WorkerConfig {
    WorkerConfig::default()
        .with_concurrency(1)
        .with_poll_interval(Duration::from_millis(5))
}

async fn wait_for(store: &dyn JobStore, id: &JobId, state: JobState) -> Vec<JobState> {
    let mut seen = Vec::new();
    for _ in 0..400 {
        let current = job_status(store, id).await.unwrap().state;
        if seen.last() != Some(&current) {
            seen.push(current);
        }
        if current == state {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached {state}; saw {seen:?}");
}

fn assert_monotonic(states: &[JobState]) {
    for pair in states.windows(2) {
        assert!(
            pair[0].rank() <= pair[1].rank(),
            "state went backwards: {states:?}"
        );
    }
}

#[tokio::test]
async fn test_submit_returns_before_analysis_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let queue = Arc::new(InMemoryQueue::new());
    let gateway = SubmissionGateway::new(
        store.clone(),
        queue.clone(),
        GatewayConfig::default().with_upload_dir(dir.path()),
    );

    let gate = Arc::new(Notify::new());
    let pool = WorkerPool::new(
        fast_workers(),
        store.clone(),
        queue.clone(),
        Arc::new(GatedAnalyzer { gate: gate.clone() }),
    );
    let (tx, rx) = watch::channel(false);
    let handles = pool.spawn(rx);

    let submission = gateway.submit(upload("Is my glucose normal?")).await.unwrap();
    let id = submission.job_id;

    let early = job_status(store.as_ref(), &id).await.unwrap();
    assert!(matches!(early.state, JobState::Pending | JobState::Processing));
    assert!(matches!(
        job_result(store.as_ref(), &id).await,
        Err(SchedError::ResultNotReady { .. })
    ));

    let mut seen = wait_for(store.as_ref(), &id, JobState::Processing).await;
    assert_eq!(pool.stats().active_jobs().await, vec![id]);

    gate.notify_one();
    seen.extend(wait_for(store.as_ref(), &id, JobState::Success).await);
    assert_monotonic(&seen);

    let result = job_result(store.as_ref(), &id).await.unwrap();
    assert_eq!(result.job_id, id);
    assert_eq!(result.query, "Is my glucose normal?");
    assert_eq!(result.processed_filename, "labs.pdf");
    assert!(result.analysis_text.contains("bytes read"));

    let report = job_status(store.as_ref(), &id).await.unwrap();
    assert_eq!(report.progress, 100);
    assert_eq!(report.result_available, Some(true));

    tx.send(true).unwrap();
    WorkerPool::join(handles).await;

    // The cleanup task is still waiting out its delay.
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.scheduled, 1);
    assert!(submission.artifact_path.exists());
}

#[tokio::test]
async fn test_failed_analysis_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let queue = Arc::new(InMemoryQueue::new());
    let gateway = SubmissionGateway::new(
        store.clone(),
        queue.clone(),
        GatewayConfig::default().with_upload_dir(dir.path()),
    );
    let pool = WorkerPool::new(fast_workers(), store.clone(), queue, Arc::new(BrokenAnalyzer));
    let (tx, rx) = watch::channel(false);
    let handles = pool.spawn(rx);

    let id = gateway.submit(upload("anything")).await.unwrap().job_id;
    let seen = wait_for(store.as_ref(), &id, JobState::Failure).await;
    assert_monotonic(&seen);

    let report = job_status(store.as_ref(), &id).await.unwrap();
    assert_eq!(report.progress, 0);
    assert_eq!(report.error, Some(true));
    assert!(report.status.contains("LLM quota exceeded"));

    match job_result(store.as_ref(), &id).await {
        Err(SchedError::JobFailed { error, .. }) => assert!(error.contains("LLM quota exceeded")),
        other => panic!("unexpected: {other:?}"),
    }

    tx.send(true).unwrap();
    WorkerPool::join(handles).await;
}

#[tokio::test]
async fn test_unknown_job() {
    let store = SqliteStore::in_memory().unwrap();
    let id = JobId::new();
    assert!(matches!(
        job_status(&store, &id).await,
        Err(SchedError::JobNotFound(_))
    ));
    assert!(matches!(
        job_result(&store, &id).await,
        Err(SchedError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_shared_database_between_gateway_and_worker() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("assay.db");

    // The HTTP process.
    let front_store = Arc::new(SqliteStore::new(&db).unwrap());
    let front_queue = Arc::new(SqliteQueue::new(&db, Default::default()).unwrap());
    let gateway = SubmissionGateway::new(
        front_store.clone(),
        front_queue,
        GatewayConfig::default().with_upload_dir(dir.path().join("uploads")),
    );

    // A separate worker process.
    let back_store = Arc::new(SqliteStore::new(&db).unwrap());
    let back_queue = Arc::new(SqliteQueue::new(&db, Default::default()).unwrap());
    let gate = Arc::new(Notify::new());
    gate.notify_one();
    let pool = WorkerPool::new(
        fast_workers(),
        back_store,
        back_queue,
        Arc::new(GatedAnalyzer { gate }),
    );
    let (tx, rx) = watch::channel(false);
    let handles = pool.spawn(rx);

    let id = gateway.submit(upload("cholesterol")).await.unwrap().job_id;
    wait_for(front_store.as_ref(), &id, JobState::Success).await;

    tx.send(true).unwrap();
    WorkerPool::join(handles).await;
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    std::fs::write(&path, b"x").unwrap();

    let first = remove_artifact(&path).await;
    let second = remove_artifact(&path).await;
    assert_eq!(first.to_string(), "File cleaned up successfully");
    assert_eq!(second.to_string(), "File not found");
    assert!(!path.exists());
}
