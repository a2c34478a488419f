//! Job result endpoint.

use std::sync::Arc;

use assay_sched::job_result;
use axum::{
    Json,
    extract::{Path, State},
};

use super::parse_task_id;
use crate::dto::ResultResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /result/{task_id} - The analysis of a successful job.
///
/// 202 while the job is pending or processing, 400 if it failed.
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let job_id = parse_task_id(&id)?;
    let result = job_result(state.store.as_ref(), &job_id).await?;
    Ok(Json(result.into()))
}
