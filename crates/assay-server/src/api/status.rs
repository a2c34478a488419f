//! Job status endpoint.

use std::sync::Arc;

use assay_sched::{StatusReport, job_status};
use axum::{
    Json,
    extract::{Path, State},
};

use super::parse_task_id;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /status/{task_id} - Current state and progress.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let job_id = parse_task_id(&id)?;
    Ok(Json(job_status(state.store.as_ref(), &job_id).await?))
}
