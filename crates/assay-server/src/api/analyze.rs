//! Report submission endpoint.

use std::sync::Arc;

use assay_sched::Upload;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use tracing::info;

use crate::dto::AnalyzeResponse;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_FILENAME: &str = "upload.bin";

/// POST /analyze - Store the report and queue its analysis.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut query: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Could not read file", e))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("query") => {
                query = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error("Could not read query", e))?,
                );
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    let submission = state
        .gateway
        .submit(Upload {
            bytes,
            filename,
            query,
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Error processing blood report: {e}")))?;

    info!(task_id = %submission.job_id, "Report accepted");
    Ok(Json(AnalyzeResponse::queued(submission.job_id)))
}

fn multipart_error(context: &str, e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("{context}: {}", e.body_text()))
    } else {
        ApiError::BadRequest(format!("{context}: {}", e.body_text()))
    }
}
