//! Error types for the HTTP API.

use assay_sched::SchedError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    /// Job is still pending or processing.
    #[error("{0}")]
    ResultNotReady(String),

    #[error("{0}")]
    JobFailed(String),

    #[error("{0}")]
    BadRequest(String),

    /// Upload exceeds the configured body limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ResultNotReady(_) => StatusCode::ACCEPTED,
            ApiError::JobFailed(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "Task not found",
            ApiError::ResultNotReady(_) => "Task not completed yet",
            ApiError::JobFailed(_) => "Task failed",
            ApiError::BadRequest(_) => "Bad request",
            ApiError::PayloadTooLarge(_) => "File too large",
            ApiError::Internal(_) => "Internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.summary(), self);
        }

        let body = Json(ErrorResponse {
            error: self.summary().to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<SchedError> for ApiError {
    fn from(e: SchedError) -> Self {
        match e {
            SchedError::JobNotFound(id) => ApiError::NotFound(format!("Task not found: {id}")),
            SchedError::ResultNotReady { state, .. } => {
                ApiError::ResultNotReady(format!("Task status: {state}"))
            }
            SchedError::JobFailed { error, .. } => ApiError::JobFailed(error),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
