//! Submission gateway: accept an upload and return a job id without
//! waiting on the analysis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cleanup::{remove_artifact, schedule_cleanup};
use crate::config::GatewayConfig;
use crate::error::{SchedError, SchedResult};
use crate::job::{Job, JobId, JobInput, JobStatus};
use crate::persistence::JobStore;
use crate::queue::{AnalyzeTask, Task, TaskQueue};

/// Longest file extension carried over from the client's filename.
const MAX_EXTENSION_LEN: usize = 8;

/// An uploaded document plus the user's question.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub query: Option<String>,
}

/// Returned as soon as the job is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job_id: JobId,
    pub artifact_path: PathBuf,
}

/// Persists uploads, creates jobs and queues the work.
pub struct SubmissionGateway {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    config: GatewayConfig,
}

impl SubmissionGateway {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Trimmed query, or the configured default when it is blank.
    pub fn normalize_query(&self, query: Option<&str>) -> String {
        normalize_query(query, &self.config.default_query)
    }

    /// Where the artifact for `job_id` lives. Never derived from client input
    /// other than a sanitised extension.
    pub fn artifact_path(&self, job_id: &JobId, filename: &str) -> PathBuf {
        self.config
            .upload_dir
            .join(format!("report_{job_id}.{}", sanitized_extension(filename)))
    }

    /// Store the upload, create a pending job, queue its analysis and its
    /// cleanup.
    pub async fn submit(&self, upload: Upload) -> SchedResult<Submission> {
        let job_id = JobId::new();
        let artifact_path = self.artifact_path(&job_id, &upload.filename);

        write_artifact(&self.config.upload_dir, &artifact_path, &upload.bytes).await?;

        let input = JobInput {
            query: self.normalize_query(upload.query.as_deref()),
            artifact_path: artifact_path.clone(),
            original_filename: upload.filename,
        };

        if let Err(e) = self.enqueue(job_id, &input).await {
            let outcome = remove_artifact(&artifact_path).await;
            warn!(%job_id, %outcome, "Submission rolled back: {}", e);
            return Err(e);
        }

        if let Err(e) =
            schedule_cleanup(self.queue.as_ref(), &artifact_path, self.config.cleanup_delay).await
        {
            warn!(%job_id, "Could not schedule cleanup of {}: {}", artifact_path.display(), e);
        }

        info!(%job_id, file = %input.original_filename, "Analysis job queued");
        Ok(Submission {
            job_id,
            artifact_path,
        })
    }

    async fn enqueue(&self, job_id: JobId, input: &JobInput) -> SchedResult<()> {
        self.store.create(&Job::new(job_id, input.clone())).await?;

        let task = Task::Analyze(AnalyzeTask {
            job_id,
            query: input.query.clone(),
            artifact_path: input.artifact_path.clone(),
            original_filename: input.original_filename.clone(),
        });

        if let Err(e) = self.queue.push(task).await {
            // The id is never handed out, but its record must not sit in
            // PENDING forever.
            if let Err(mark) = self
                .store
                .transition(&job_id, JobStatus::failure(format!("Error: {e}")))
                .await
            {
                warn!(%job_id, "Could not mark unqueued job as failed: {}", mark);
            }
            return Err(e);
        }
        Ok(())
    }
}

async fn write_artifact(dir: &Path, path: &Path, bytes: &[u8]) -> SchedResult<()> {
    let write = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(path, bytes).await
    };

    if let Err(source) = write.await {
        // A partial file must not outlive a failed submission.
        let _ = remove_artifact(path).await;
        return Err(SchedError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Trimmed `query`, or `default` when it is missing or blank.
pub fn normalize_query(query: Option<&str>, default: &str) -> String {
    match query.map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => default.trim().to_string(),
    }
}

/// Lowercase alphanumeric extension of `filename`, `bin` if there is none.
pub fn sanitized_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_QUERY;
    use crate::job::JobState;
    use crate::persistence::SqliteStore;
    use crate::queue::{InMemoryQueue, QueueStats};
    use proptest::prelude::*;

    fn gateway(dir: &Path) -> (SubmissionGateway, Arc<SqliteStore>, Arc<InMemoryQueue>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let queue = Arc::new(InMemoryQueue::new());
        let gateway = SubmissionGateway::new(
            store.clone(),
            queue.clone(),
            GatewayConfig::default().with_upload_dir(dir),
        );
        (gateway, store, queue)
    }

    fn upload(query: Option<&str>) -> Upload {
        Upload {
            bytes: b"Hemoglobin 13.5 g/dL".to_vec(),
            filename: "blood test.PDF".to_string(),
            query: query.map(str::to_string),
        }
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("report.PDF"), "pdf");
        assert_eq!(sanitized_extension("archive.tar.gz"), "gz");
        assert_eq!(sanitized_extension("noext"), "bin");
        assert_eq!(sanitized_extension("../../etc/passwd"), "bin");
        assert_eq!(sanitized_extension("x.p$f"), "bin");
        assert_eq!(sanitized_extension("x.verylongextension"), "bin");
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query(None, DEFAULT_QUERY), DEFAULT_QUERY);
        assert_eq!(normalize_query(Some(""), DEFAULT_QUERY), DEFAULT_QUERY);
        assert_eq!(normalize_query(Some("  \t "), DEFAULT_QUERY), DEFAULT_QUERY);
        assert_eq!(
            normalize_query(Some("  iron levels? "), DEFAULT_QUERY),
            "iron levels?"
        );
    }

    proptest! {
        #[test]
        fn prop_normalized_query_is_trimmed_and_non_empty(q in ".*") {
            let out = normalize_query(Some(&q), DEFAULT_QUERY);
            prop_assert!(!out.is_empty());
            prop_assert_eq!(out.trim(), out.as_str());
        }

        #[test]
        fn prop_artifact_stays_in_upload_dir(name in ".*") {
            let ext = sanitized_extension(&name);
            prop_assert!(!ext.contains('/') && !ext.contains('\\') && !ext.contains('.'));
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job_and_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let (gateway, store, queue) = gateway(dir.path());

        let submission = gateway.submit(upload(Some("  cholesterol? "))).await.unwrap();
        assert!(submission.artifact_path.starts_with(dir.path()));
        assert_eq!(
            submission.artifact_path.file_name().unwrap().to_str().unwrap(),
            format!("report_{}.pdf", submission.job_id)
        );
        assert_eq!(
            std::fs::read(&submission.artifact_path).unwrap(),
            b"Hemoglobin 13.5 g/dL"
        );

        let job = store.get(&submission.job_id).await.unwrap().unwrap();
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.input.query, "cholesterol?");
        assert_eq!(job.input.original_filename, "blood test.PDF");

        // One analysis ready now, one cleanup an hour out.
        let stats = queue.stats().await.unwrap();
        assert_eq!(
            stats,
            QueueStats {
                ready: 1,
                scheduled: 1,
                in_flight: 0
            }
        );
        let delivery = queue.dequeue().await.unwrap().unwrap();
        match delivery.task {
            Task::Analyze(task) => {
                assert_eq!(task.job_id, submission.job_id);
                assert_eq!(task.artifact_path, submission.artifact_path);
            }
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_query_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let (gateway, store, _queue) = gateway(dir.path());

        let submission = gateway.submit(upload(Some(""))).await.unwrap();
        let job = store.get(&submission.job_id).await.unwrap().unwrap();
        assert_eq!(job.input.query, DEFAULT_QUERY);
    }

    #[tokio::test]
    async fn test_write_failure_enqueues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the upload directory should be.
        let blocker = dir.path().join("uploads");
        std::fs::write(&blocker, b"").unwrap();
        let (gateway, store, queue) = gateway(&blocker);

        let err = gateway.submit(upload(None)).await.unwrap_err();
        assert!(matches!(err, SchedError::ArtifactWrite { .. }));
        assert_eq!(queue.stats().await.unwrap(), QueueStats::default());
        assert_eq!(store.count_by_state().await.unwrap().total(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_failure_rolls_back_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (gateway, store, queue) = gateway(dir.path());
        queue.close();

        let err = gateway.submit(upload(None)).await.unwrap_err();
        assert!(matches!(err, SchedError::QueueUnavailable(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let counts = store.count_by_state().await.unwrap();
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.failure, 1);
    }
}
