//! Persistence layer for job state.

mod json_store;
mod sqlite_store;

pub use json_store::JsonStore;
pub use sqlite_store::SqliteStore;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::error::SchedResult;
use crate::job::{Job, JobFilter, JobId, JobStatus, StateCounts};

/// Durable job records shared by the submitting process and the workers.
///
/// Readers may poll while the owning worker writes; each
/// [`transition`](JobStore::transition) is applied atomically per job so a
/// reader only ever sees whole snapshots, in write order.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `JobAlreadyExists` on a duplicate id.
    async fn create(&self, job: &Job) -> SchedResult<()>;

    /// Load a job.
    async fn get(&self, job_id: &JobId) -> SchedResult<Option<Job>>;

    /// Apply a forward state change and return the updated job.
    async fn transition(&self, job_id: &JobId, status: JobStatus) -> SchedResult<Job>;

    /// List jobs matching a filter, newest first.
    async fn list(&self, filter: &JobFilter) -> SchedResult<Vec<Job>>;

    /// Count jobs per state.
    async fn count_by_state(&self) -> SchedResult<StateCounts>;
}

/// Open a SQLite connection suitable for sharing a database file between
/// processes. `None` opens a private in-memory database.
pub(crate) fn open_sqlite(path: Option<&Path>) -> SchedResult<Connection> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            Ok(conn)
        }
        None => Ok(Connection::open_in_memory()?),
    }
}
