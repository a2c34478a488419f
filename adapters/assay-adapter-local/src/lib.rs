//! Assay Local Excerpt Analyzer
//!
//! A self-contained [`Analyzer`](assay_agent::Analyzer) that needs no
//! external service. It pulls readable text out of the uploaded file, picks
//! the lines that mention words from the query, and reports them together
//! with a short excerpt. Useful for development, demos and tests; it makes
//! no attempt at understanding the document.
//!
//! # Example
//!
//! ```ignore
//! use assay_adapter_local::ExcerptAnalyzer;
//! use assay_agent::{AnalysisRequest, Analyzer};
//!
//! let analyzer = ExcerptAnalyzer::new().with_excerpt_chars(400);
//! let output = analyzer
//!     .analyze(&AnalysisRequest::new("cholesterol", "data/report.pdf"))
//!     .await?;
//! ```

mod excerpt;

pub use excerpt::{ExcerptAnalyzer, extract_text};
