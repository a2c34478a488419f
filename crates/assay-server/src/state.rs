//! Application state for the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use assay_sched::{GatewayConfig, JobStore, PoolStats, SubmissionGateway, TaskQueue};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: ([127, 0, 0, 1], 8000).into(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub gateway: SubmissionGateway,
    /// Worker counters, when workers run in this process.
    pub pool_stats: Option<Arc<PoolStats>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        gateway_config: GatewayConfig,
    ) -> Self {
        let gateway =
            SubmissionGateway::new(Arc::clone(&store), Arc::clone(&queue), gateway_config);
        Self {
            config,
            store,
            queue,
            gateway,
            pool_stats: None,
        }
    }

    /// Report statistics of an in-process worker pool.
    pub fn with_pool_stats(mut self, stats: Arc<PoolStats>) -> Self {
        self.pool_stats = Some(stats);
        self
    }
}
