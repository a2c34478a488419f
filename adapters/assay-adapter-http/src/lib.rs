//! Assay adapter for remote agent orchestration services.
//!
//! The analysis itself (document parsing, multi-step agent runs,
//! recommendations) lives in a separate service. This adapter forwards the
//! query and artifact path to it and returns whatever text it produces.
//!
//! # Wire format
//!
//! ```text
//! POST {base_url}/analyze
//! Authorization: Bearer <token>        (optional)
//! {"query": "...", "file_path": "data/report_<id>.pdf"}
//!
//! 200 OK
//! {"text": "..."}
//! ```
//!
//! The artifact path must be readable by the remote service, so both sides
//! need the same shared storage mount.

mod client;

pub use client::{HttpAnalyzer, HttpAnalyzerConfig};
