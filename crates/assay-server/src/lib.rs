//! Assay HTTP server.
//!
//! Accepts report uploads, queues them for analysis and serves job status
//! and results:
//!
//! - `POST /analyze`: multipart `file` (+ optional `query`), returns a task id
//! - `GET /status/{task_id}`: state and progress
//! - `GET /result/{task_id}`: the analysis once it has succeeded
//! - `GET /queue/stats`: queue depth, job counts, worker activity
//! - `GET /`: service descriptor
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use assay_sched::{GatewayConfig, InMemoryQueue, SqliteStore};
//! use assay_server::{AppState, ServerConfig, create_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let state = Arc::new(AppState::new(
//!         config.clone(),
//!         Arc::new(SqliteStore::in_memory()?),
//!         Arc::new(InMemoryQueue::new()),
//!         GatewayConfig::default(),
//!     ));
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
//!     axum::serve(listener, create_router(state)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod dto;
pub mod error;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::create_router;
pub use state::{AppState, ServerConfig};
