//! Analyzer trait and request/response types.
//!
//! ```text
//!   AnalysisRequest ──→ analyze() ──→ AnalysisOutput
//!   (query, file_path)   (async)       (text)
//! ```
//!
//! An analysis may take seconds to minutes and may fail. No timeout is
//! imposed here; adapters and queue backends decide that for themselves.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;

/// Input handed to an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The user's question about the document.
    pub query: String,
    /// Path of the uploaded artifact on shared storage.
    pub file_path: PathBuf,
}

impl AnalysisRequest {
    /// Create a new request.
    pub fn new(query: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            query: query.into(),
            file_path: file_path.into(),
        }
    }

    /// Path of the artifact to analyze.
    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Text produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    /// Free-form analysis text.
    pub text: String,
}

impl AnalysisOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl std::fmt::Display for AnalysisOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// An opaque analysis collaborator.
///
/// Implementations must be `Send + Sync`: one instance is shared by every
/// worker in a pool.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Short name used in logs and stats.
    fn name(&self) -> &str;

    /// Analyze the artifact at `request.file_path` against `request.query`.
    async fn analyze(&self, request: &AnalysisRequest) -> AgentResult<AnalysisOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    struct Upper;

    #[async_trait]
    impl Analyzer for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn analyze(&self, request: &AnalysisRequest) -> AgentResult<AnalysisOutput> {
            if request.query.is_empty() {
                return Err(AgentError::InvalidInput("empty query".into()));
            }
            Ok(AnalysisOutput::new(request.query.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_analyzer_object_safety() {
        let analyzer: Box<dyn Analyzer> = Box::new(Upper);
        let out = analyzer
            .analyze(&AnalysisRequest::new("hdl levels", "x.pdf"))
            .await
            .unwrap();
        assert_eq!(out.text, "HDL LEVELS");
        assert_eq!(analyzer.name(), "upper");

        let err = analyzer
            .analyze(&AnalysisRequest::new("", "x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[test]
    fn test_request_serde_shape() {
        let req = AnalysisRequest::new("q", "data/report_1.pdf");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["query"], "q");
        assert_eq!(json["file_path"], "data/report_1.pdf");
    }
}
