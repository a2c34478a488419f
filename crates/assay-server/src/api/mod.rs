//! API endpoint handlers.

pub mod analyze;
pub mod queue;
pub mod result;
pub mod root;
pub mod status;

use assay_sched::JobId;

use crate::error::ApiError;

/// Parse a task id from a path segment. Malformed ids cannot name a task,
/// so they are reported as not found.
pub(crate) fn parse_task_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw).map_err(|_| ApiError::NotFound(format!("Task not found: {raw}")))
}
