//! Assay Analysis Collaborator Contract
//!
//! This crate defines the boundary between the job lifecycle core and the
//! component that actually reads an uploaded report and answers the user's
//! query. The core never looks inside an analysis: it hands over a query and
//! a file path and gets back text, or an error.
//!
//! # Overview
//!
//! - A common [`Analyzer`] trait implemented by every analysis adapter
//! - [`AnalysisRequest`] / [`AnalysisOutput`] as the only data crossing the boundary
//! - [`AgentError`] for the ways an analysis can fail
//!
//! # Available Analyzers
//!
//! | Analyzer | Crate | Notes |
//! |----------|-------|-------|
//! | Local excerpt | `assay-adapter-local` | No external service, for development |
//! | Agent service | `assay-adapter-http` | `ASSAY_AGENT_URL`, optional token |
//!
//! # Example
//!
//! ```ignore
//! use assay_agent::{AnalysisRequest, Analyzer};
//! use assay_adapter_local::ExcerptAnalyzer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let analyzer = ExcerptAnalyzer::new();
//!     let request = AnalysisRequest::new("Summarise my report", "data/report.pdf");
//!     let output = analyzer.analyze(&request).await?;
//!     println!("{}", output.text);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod error;

pub use analyzer::{AnalysisOutput, AnalysisRequest, Analyzer};
pub use error::{AgentError, AgentResult};
