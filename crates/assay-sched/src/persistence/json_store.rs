//! JSON file-based persistence for development and testing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{SchedError, SchedResult};
use crate::job::{Job, JobFilter, JobId, JobStatus, StateCounts};
use crate::persistence::JobStore;

/// JSON file-based job store.
///
/// Stores each job as a separate JSON file, replaced atomically on every
/// write, so another process polling the same directory never reads a
/// half-written record. Suitable for development and testing, not
/// recommended for production use.
pub struct JsonStore {
    /// Directory holding one `<id>.json` per job.
    jobs_dir: PathBuf,

    /// Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Create a new JSON store at the given path.
    pub async fn new(base_dir: impl AsRef<Path>) -> SchedResult<Self> {
        let jobs_dir = base_dir.as_ref().join("jobs");
        fs::create_dir_all(&jobs_dir).await?;

        Ok(Self {
            jobs_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a new JSON store in a temporary directory.
    pub async fn temp() -> SchedResult<Self> {
        let temp_dir = std::env::temp_dir().join(format!("assay-jobs-{}", uuid::Uuid::new_v4()));
        Self::new(temp_dir).await
    }

    fn job_path(&self, job_id: &JobId) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    async fn read(&self, path: &Path) -> SchedResult<Option<Job>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SchedError::IoError(e)),
        }
    }

    async fn write(&self, job: &Job) -> SchedResult<()> {
        let path = self.job_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(job)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_all(&self) -> SchedResult<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match self.read(&path).await {
                    Ok(Some(job)) => jobs.push(job),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Failed to read job file {:?}: {}", path, e);
                    }
                }
            }
        }
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for JsonStore {
    async fn create(&self, job: &Job) -> SchedResult<()> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.job_path(&job.id)).await? {
            return Err(SchedError::JobAlreadyExists(job.id.to_string()));
        }
        self.write(job).await
    }

    async fn get(&self, job_id: &JobId) -> SchedResult<Option<Job>> {
        self.read(&self.job_path(job_id)).await
    }

    async fn transition(&self, job_id: &JobId, status: JobStatus) -> SchedResult<Job> {
        let _guard = self.write_lock.lock().await;
        let mut job = self
            .read(&self.job_path(job_id))
            .await?
            .ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))?;
        job.transition(status)?;
        self.write(&job).await?;
        Ok(job)
    }

    async fn list(&self, filter: &JobFilter) -> SchedResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }

        Ok(jobs)
    }

    async fn count_by_state(&self) -> SchedResult<StateCounts> {
        let mut counts = StateCounts::default();
        for job in self.load_all().await? {
            counts.add(job.state(), 1);
        }
        Ok(counts)
    }
}
