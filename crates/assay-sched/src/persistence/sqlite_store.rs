//! SQLite-based persistence for production use.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::error::{SchedError, SchedResult};
use crate::job::{Job, JobFilter, JobId, JobState, JobStatus, StateCounts};
use crate::persistence::{JobStore, open_sqlite};

/// SQLite-based job store.
///
/// A database file can be opened by the HTTP process and by any number of
/// worker processes at once; state changes run inside immediate
/// transactions.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> SchedResult<Self> {
        Self::from_connection(open_sqlite(Some(path.as_ref()))?)
    }

    /// Create a private in-memory store.
    pub fn in_memory() -> SchedResult<Self> {
        Self::from_connection(open_sqlite(None)?)
    }

    fn from_connection(conn: Connection) -> SchedResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> SchedResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SchedError::DatabaseError(e.to_string()))
    }
}

fn load(conn: &Connection, job_id: &JobId) -> SchedResult<Option<Job>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM jobs WHERE id = ?1",
            rusqlite::params![job_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, job: &Job) -> SchedResult<()> {
        let conn = self.lock()?;
        let data = serde_json::to_string(job)?;

        let result = conn.execute(
            r#"
            INSERT INTO jobs (id, state, data, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            rusqlite::params![
                job.id.to_string(),
                job.state().as_str(),
                data,
                job.created_at.to_rfc3339(),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SchedError::JobAlreadyExists(job.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, job_id: &JobId) -> SchedResult<Option<Job>> {
        let conn = self.lock()?;
        load(&conn, job_id)
    }

    async fn transition(&self, job_id: &JobId, status: JobStatus) -> SchedResult<Job> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut job =
            load(&tx, job_id)?.ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))?;
        job.transition(status)?;

        tx.execute(
            "UPDATE jobs SET state = ?2, data = ?3, completed_at = ?4 WHERE id = ?1",
            rusqlite::params![
                job_id.to_string(),
                job.state().as_str(),
                serde_json::to_string(&job)?,
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        tx.commit()?;

        Ok(job)
    }

    async fn list(&self, filter: &JobFilter) -> SchedResult<Vec<Job>> {
        let conn = self.lock()?;

        let mut sql = String::from("SELECT data FROM jobs");
        let mut params: Vec<String> = Vec::new();
        if let Some(states) = filter.states.as_ref().filter(|s| !s.is_empty()) {
            let placeholders: Vec<String> =
                (1..=states.len()).map(|i| format!("?{i}")).collect();
            sql.push_str(&format!(" WHERE state IN ({})", placeholders.join(", ")));
            params.extend(states.iter().map(|s| s.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            row.get::<_, String>(0)
        })?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(serde_json::from_str(&row?)?);
        }
        Ok(jobs)
    }

    async fn count_by_state(&self) -> SchedResult<StateCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StateCounts::default();
        for row in rows {
            let (state, n) = row?;
            match JobState::parse(&state) {
                Some(state) => counts.add(state, usize::try_from(n).unwrap_or_default()),
                None => tracing::warn!("Unknown job state in store: {}", state),
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{AnalysisResult, JobInput};
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

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SqliteStore::in_memory().unwrap();
        let job = job();
        store.create(&job).await.unwrap();

        let loaded = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(store.get(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let job = job();
        store.create(&job).await.unwrap();
        let err = store.create(&job).await.unwrap_err();
        assert!(matches!(err, SchedError::JobAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_transition_persists_and_enforces_order() {
        let store = SqliteStore::in_memory().unwrap();
        let job = job();
        store.create(&job).await.unwrap();

        store
            .transition(&job.id, JobStatus::processing(25, "working"))
            .await
            .unwrap();
        let done = store
            .transition(
                &job.id,
                JobStatus::Success {
                    result: AnalysisResult {
                        query: "Summarise".to_string(),
                        analysis_text: "fine".to_string(),
                        processed_filename: "report.pdf".to_string(),
                        job_id: job.id,
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(done.state(), JobState::Success);

        let err = store
            .transition(&job.id, JobStatus::failure("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedError::InvalidTransition { .. }));

        let loaded = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.state(), JobState::Success);
    }

    #[tokio::test]
    async fn test_transition_unknown_job() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .transition(&JobId::new(), JobStatus::failure("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_and_counts() {
        let store = SqliteStore::in_memory().unwrap();
        let a = job();
        let b = job();
        let c = job();
        for j in [&a, &b, &c] {
            store.create(j).await.unwrap();
        }
        store
            .transition(&b.id, JobStatus::processing(25, "x"))
            .await
            .unwrap();
        store
            .transition(&c.id, JobStatus::failure("bad file"))
            .await
            .unwrap();

        let pending = store
            .list(&JobFilter::default().with_state(JobState::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let limited = store
            .list(&JobFilter::default().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let counts = store.count_by_state().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.failure, 1);
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test]
    async fn test_two_handles_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let writer = SqliteStore::new(&path).unwrap();
        let reader = SqliteStore::new(&path).unwrap();

        let job = job();
        writer.create(&job).await.unwrap();
        writer
            .transition(&job.id, JobStatus::processing(25, "x"))
            .await
            .unwrap();

        let seen = reader.get(&job.id).await.unwrap().unwrap();
        assert_eq!(seen.state(), JobState::Processing);
    }
}
