//! Service descriptor.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::dto::RootResponse;
use crate::state::AppState;

/// GET / - Service name, version and endpoints.
pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse::new(state.queue.stats().await.is_ok()))
}
