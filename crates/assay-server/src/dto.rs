//! Data transfer objects for API responses.

use std::collections::BTreeMap;

use assay_sched::{AnalysisResult, JobId, StateCounts, WorkerStats};
use serde::Serialize;

/// Reply to `POST /analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    pub task_id: JobId,
    pub message: &'static str,
    pub check_status_url: String,
    pub get_result_url: String,
}

impl AnalyzeResponse {
    pub fn queued(task_id: JobId) -> Self {
        Self {
            status: "queued",
            task_id,
            message: "Analysis job queued successfully",
            check_status_url: format!("/status/{task_id}"),
            get_result_url: format!("/result/{task_id}"),
        }
    }
}

/// Reply to `GET /result/{task_id}` for a finished job.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

impl From<AnalysisResult> for ResultResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            status: "SUCCESS",
            result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    /// Tasks ready to run.
    pub queue_length: usize,
    /// Tasks waiting for a delay (cleanups, retries).
    pub scheduled: usize,
    pub in_flight: usize,
    pub jobs: StateCounts,
    /// Absent when workers run in other processes.
    pub worker_stats: Option<Vec<WorkerStats>>,
    pub active_tasks: Vec<JobId>,
}

#[derive(Debug, Serialize)]
pub struct QueueStatsError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub queue_status: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

impl RootResponse {
    pub fn new(queue_available: bool) -> Self {
        let endpoints = BTreeMap::from([
            ("analyze", "POST /analyze"),
            ("status", "GET /status/{task_id}"),
            ("result", "GET /result/{task_id}"),
            ("queue_stats", "GET /queue/stats"),
        ]);

        Self {
            message: "Blood Test Report Analyser API is running",
            version: env!("CARGO_PKG_VERSION"),
            queue_status: if queue_available {
                "connected"
            } else {
                "unavailable"
            },
            endpoints,
        }
    }
}
