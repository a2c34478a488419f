//! Client-facing status and result translation.
//!
//! Pure reads from the [`JobStore`]; the queue and the artifact are never
//! consulted.
//!
//! | state | progress | status | extra |
//! |---|---|---|---|
//! | PENDING | 0 | "Task is waiting in queue..." |  |
//! | PROCESSING | job progress | job message |  |
//! | SUCCESS | 100 | "Analysis completed successfully" | `result_available` |
//! | FAILURE | 0 | error text | `error` |

use serde::Serialize;

use crate::error::{SchedError, SchedResult};
use crate::job::{AnalysisResult, Job, JobId, JobState, JobStatus};
use crate::persistence::JobStore;

/// Status message shown while a job waits in the queue.
pub const PENDING_MESSAGE: &str = "Task is waiting in queue...";

/// Status message shown once a result is available.
pub const SUCCESS_MESSAGE: &str = "Analysis completed successfully";

/// Externally visible view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub task_id: String,
    pub state: JobState,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl StatusReport {
    pub fn from_job(job: &Job) -> Self {
        let (status, result_available, error) = match &job.status {
            JobStatus::Pending => (PENDING_MESSAGE.to_string(), None, None),
            JobStatus::Processing { message, .. } => (message.clone(), None, None),
            JobStatus::Success { .. } => (SUCCESS_MESSAGE.to_string(), Some(true), None),
            JobStatus::Failure { error } => (error.clone(), None, Some(true)),
        };

        Self {
            task_id: job.id.to_string(),
            state: job.state(),
            status,
            progress: job.status.progress(),
            result_available,
            error,
        }
    }
}

/// Current status of `job_id`.
pub async fn job_status(store: &dyn JobStore, job_id: &JobId) -> SchedResult<StatusReport> {
    let job = store
        .get(job_id)
        .await?
        .ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))?;
    Ok(StatusReport::from_job(&job))
}

/// Stored result of `job_id`, only once it succeeded.
pub async fn job_result(store: &dyn JobStore, job_id: &JobId) -> SchedResult<AnalysisResult> {
    let job = store
        .get(job_id)
        .await?
        .ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))?;

    match job.status {
        JobStatus::Success { result } => Ok(result),
        JobStatus::Failure { error } => Err(SchedError::JobFailed {
            job_id: job_id.to_string(),
            error,
        }),
        status => Err(SchedError::ResultNotReady {
            job_id: job_id.to_string(),
            state: status.state(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobInput;
    use crate::persistence::SqliteStore;
    use std::path::PathBuf;

    fn job() -> Job {
        Job::new(
            JobId::new(),
            JobInput {
                query: "Summarise".to_string(),
                artifact_path: PathBuf::from("data/report.pdf"),
                original_filename: "report.pdf".to_string(),
            },
        )
    }

    fn result_for(job: &Job) -> AnalysisResult {
        AnalysisResult {
            query: job.input.query.clone(),
            analysis_text: "All markers within range.".to_string(),
            processed_filename: job.input.original_filename.clone(),
            job_id: job.id,
        }
    }

    #[test]
    fn test_translation_table() {
        let mut job = job();
        let pending = StatusReport::from_job(&job);
        assert_eq!(pending.state, JobState::Pending);
        assert_eq!(pending.progress, 0);
        assert_eq!(pending.status, PENDING_MESSAGE);
        assert_eq!(pending.result_available, None);

        job.transition(JobStatus::processing(25, "Processing report..."))
            .unwrap();
        let processing = StatusReport::from_job(&job);
        assert_eq!(processing.progress, 25);
        assert_eq!(processing.status, "Processing report...");

        let result = result_for(&job);
        job.transition(JobStatus::Success { result }).unwrap();
        let done = StatusReport::from_job(&job);
        assert_eq!(done.progress, 100);
        assert_eq!(done.status, SUCCESS_MESSAGE);
        assert_eq!(done.result_available, Some(true));
        assert_eq!(done.error, None);
    }

    #[test]
    fn test_failure_translation() {
        let mut job = job();
        job.transition(JobStatus::failure("Error: unreadable file"))
            .unwrap();
        let report = StatusReport::from_job(&job);
        assert_eq!(report.state, JobState::Failure);
        assert_eq!(report.progress, 0);
        assert_eq!(report.status, "Error: unreadable file");
        assert_eq!(report.error, Some(true));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "FAILURE");
        assert!(json.get("result_available").is_none());
    }

    #[tokio::test]
    async fn test_result_gating() {
        let store = SqliteStore::in_memory().unwrap();
        let job = job();
        store.create(&job).await.unwrap();

        assert!(matches!(
            job_result(&store, &job.id).await,
            Err(SchedError::ResultNotReady {
                state: JobState::Pending,
                ..
            })
        ));

        store
            .transition(&job.id, JobStatus::processing(90, "formatting"))
            .await
            .unwrap();
        assert!(matches!(
            job_result(&store, &job.id).await,
            Err(SchedError::ResultNotReady {
                state: JobState::Processing,
                ..
            })
        ));

        let expected = result_for(&job);
        store
            .transition(
                &job.id,
                JobStatus::Success {
                    result: expected.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(job_result(&store, &job.id).await.unwrap(), expected);
        // Terminal reads are stable.
        assert_eq!(job_result(&store, &job.id).await.unwrap(), expected);
        assert_eq!(
            job_status(&store, &job.id).await.unwrap(),
            job_status(&store, &job.id).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_and_failed() {
        let store = SqliteStore::in_memory().unwrap();
        let unknown = JobId::new();
        assert!(matches!(
            job_status(&store, &unknown).await,
            Err(SchedError::JobNotFound(_))
        ));
        assert!(matches!(
            job_result(&store, &unknown).await,
            Err(SchedError::JobNotFound(_))
        ));

        let job = job();
        store.create(&job).await.unwrap();
        store
            .transition(&job.id, JobStatus::failure("Error: agent crashed"))
            .await
            .unwrap();
        match job_result(&store, &job.id).await {
            Err(SchedError::JobFailed { error, .. }) => assert_eq!(error, "Error: agent crashed"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
