//! Queue statistics endpoint.

use std::sync::Arc;

use assay_sched::SchedResult;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::dto::{QueueStatsError, QueueStatsResponse};
use crate::state::AppState;

/// GET /queue/stats - Queue depth, job counts and worker activity.
///
/// Backend failures are reported in the body with status 200.
pub async fn queue_stats(State(state): State<Arc<AppState>>) -> Response {
    match collect(&state).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            warn!("Could not collect queue stats: {}", e);
            Json(QueueStatsError {
                error: format!("Could not get queue stats: {e}"),
            })
            .into_response()
        }
    }
}

async fn collect(state: &AppState) -> SchedResult<QueueStatsResponse> {
    let queue = state.queue.stats().await?;
    let jobs = state.store.count_by_state().await?;

    let (worker_stats, active_tasks) = match &state.pool_stats {
        Some(pool) => (Some(pool.snapshot().await), pool.active_jobs().await),
        None => (None, Vec::new()),
    };

    Ok(QueueStatsResponse {
        queue_length: queue.ready,
        scheduled: queue.scheduled,
        in_flight: queue.in_flight,
        jobs,
        worker_stats,
        active_tasks,
    })
}
