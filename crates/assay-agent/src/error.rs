//! Error types for the agent crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while running an analysis.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// The artifact could not be read.
    #[error("Cannot read file {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request was rejected before analysis started.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network error talking to a remote agent.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote agent answered with a non-success status.
    #[error("Agent service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic analysis failure.
    #[error("Analysis failed: {0}")]
    Failed(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
