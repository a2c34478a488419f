//! Assay binary: HTTP front end and standalone workers.
//!
//! ```text
//! assay serve  --database assay.db --workers 2   # API + in-process workers
//! assay serve  --database assay.db --workers 0   # API only
//! assay worker --database assay.db --workers 4   # workers only
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use assay_adapter_http::{HttpAnalyzer, HttpAnalyzerConfig};
use assay_adapter_local::ExcerptAnalyzer;
use assay_agent::Analyzer;
use assay_sched::{
    GatewayConfig, InMemoryQueue, JobStore, QueueConfig, SqliteQueue, SqliteStore, TaskQueue,
    WorkerConfig, WorkerPool,
};
use assay_server::{AppState, ServerConfig, create_router};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Assay - asynchronous document analysis queue
#[derive(Parser)]
#[command(name = "assay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API, optionally with in-process workers
    Serve {
        /// Address to listen on
        #[arg(long, env = "ASSAY_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Directory uploads are written to
        #[arg(long, env = "ASSAY_UPLOAD_DIR", default_value = "data")]
        upload_dir: PathBuf,

        /// Seconds after submission before an upload is deleted
        #[arg(long, env = "ASSAY_CLEANUP_DELAY_SECS", default_value = "3600")]
        cleanup_delay_secs: u64,

        /// Largest accepted upload, in bytes
        #[arg(long, env = "ASSAY_MAX_UPLOAD_BYTES", default_value = "20971520")]
        max_upload_bytes: usize,

        /// In-process workers (0 to rely on `assay worker` processes)
        #[arg(short, long, env = "ASSAY_WORKERS", default_value = "2")]
        workers: usize,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Run workers against a shared database
    Worker {
        /// Number of concurrent workers
        #[arg(short, long, env = "ASSAY_WORKERS", default_value = "2")]
        workers: usize,

        /// Milliseconds between polls of an empty queue
        #[arg(long, env = "ASSAY_POLL_INTERVAL_MS", default_value = "250")]
        poll_interval_ms: u64,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args)]
struct BackendArgs {
    /// SQLite database shared by the API and workers (in-memory if unset)
    #[arg(long, env = "ASSAY_DATABASE")]
    database: Option<PathBuf>,

    /// Extra attempts for a failed analysis
    #[arg(long, env = "ASSAY_MAX_RETRIES", default_value = "0")]
    max_retries: u32,

    /// Base delay before a retry, in seconds (doubles per attempt)
    #[arg(long, env = "ASSAY_RETRY_BACKOFF_SECS", default_value = "5")]
    retry_backoff_secs: u64,

    /// Seconds a claimed task may go unacknowledged before another worker
    /// takes it over
    #[arg(long, env = "ASSAY_VISIBILITY_TIMEOUT_SECS", default_value = "1800")]
    visibility_timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum AgentKind {
    /// Built-in excerpt analyzer
    Local,
    /// External analysis service
    Http,
}

#[derive(Args)]
struct AgentArgs {
    /// Analyzer implementation
    #[arg(long, env = "ASSAY_AGENT", value_enum, default_value = "local")]
    agent: AgentKind,

    /// Base URL of the analysis service
    #[arg(long, env = "ASSAY_AGENT_URL")]
    agent_url: Option<String>,

    /// Bearer token for the analysis service
    #[arg(long, env = "ASSAY_AGENT_TOKEN", hide_env_values = true)]
    agent_token: Option<String>,

    /// Per-request timeout for the analysis service, in seconds
    #[arg(long, env = "ASSAY_AGENT_TIMEOUT_SECS")]
    agent_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            bind,
            upload_dir,
            cleanup_delay_secs,
            max_upload_bytes,
            workers,
            backend,
            agent,
        } => {
            let (store, queue) = open_backend(&backend)?;
            if workers == 0 && backend.database.is_none() {
                warn!("No workers and no shared database: queued jobs will never run");
            }

            let gateway_config = GatewayConfig::default()
                .with_upload_dir(upload_dir)
                .with_cleanup_delay(Duration::from_secs(cleanup_delay_secs));
            let config = ServerConfig {
                bind_address: bind,
                max_upload_bytes,
            };

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let mut state = AppState::new(
                config,
                Arc::clone(&store),
                Arc::clone(&queue),
                gateway_config,
            );
            let mut handles = Vec::new();
            if workers > 0 {
                let pool = WorkerPool::new(
                    WorkerConfig::default().with_concurrency(workers),
                    store,
                    queue,
                    build_analyzer(&agent)?,
                );
                state = state.with_pool_stats(pool.stats());
                handles = pool.spawn(shutdown_rx);
            }

            let app = create_router(Arc::new(state));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            info!("Assay API listening on http://{}", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            let _ = shutdown_tx.send(true);
            WorkerPool::join(handles).await;
            info!("Server stopped");
        }

        Commands::Worker {
            workers,
            poll_interval_ms,
            backend,
            agent,
        } => {
            if backend.database.is_none() {
                anyhow::bail!(
                    "`assay worker` needs --database (or ASSAY_DATABASE) shared with the API"
                );
            }
            let (store, queue) = open_backend(&backend)?;
            let pool = WorkerPool::new(
                WorkerConfig::default()
                    .with_concurrency(workers)
                    .with_poll_interval(Duration::from_millis(poll_interval_ms)),
                store,
                queue,
                build_analyzer(&agent)?,
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handles = pool.spawn(shutdown_rx);
            shutdown_signal().await;

            let _ = shutdown_tx.send(true);
            WorkerPool::join(handles).await;
            info!("Workers stopped");
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "assay_server=info,assay_sched=info,tower_http=info",
        1 => "assay_server=debug,assay_sched=debug,assay_agent=debug,tower_http=debug,info",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn open_backend(args: &BackendArgs) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn TaskQueue>)> {
    let queue_config = QueueConfig::default()
        .with_max_retries(args.max_retries)
        .with_retry_backoff(Duration::from_secs(args.retry_backoff_secs))
        .with_visibility_timeout(Duration::from_secs(args.visibility_timeout_secs));

    match &args.database {
        Some(path) => {
            let store = SqliteStore::new(path)
                .with_context(|| format!("Failed to open job store at {}", path.display()))?;
            let queue = SqliteQueue::new(path, queue_config)
                .with_context(|| format!("Failed to open task queue at {}", path.display()))?;
            info!("Using SQLite database {}", path.display());
            Ok((Arc::new(store), Arc::new(queue)))
        }
        None => {
            info!("Using in-memory job store and queue");
            Ok((
                Arc::new(SqliteStore::in_memory()?),
                Arc::new(InMemoryQueue::with_config(queue_config)),
            ))
        }
    }
}

fn build_analyzer(args: &AgentArgs) -> anyhow::Result<Arc<dyn Analyzer>> {
    let analyzer: Arc<dyn Analyzer> = match args.agent {
        AgentKind::Local => Arc::new(ExcerptAnalyzer::new()),
        AgentKind::Http => {
            let url = args
                .agent_url
                .clone()
                .context("--agent http needs --agent-url (or ASSAY_AGENT_URL)")?;
            let mut config = HttpAnalyzerConfig::new(url);
            if let Some(token) = &args.agent_token {
                config = config.with_token(token.clone());
            }
            if let Some(secs) = args.agent_timeout_secs {
                config = config.with_request_timeout(Duration::from_secs(secs));
            }
            Arc::new(HttpAnalyzer::new(config)?)
        }
    };
    info!(analyzer = analyzer.name(), "Analyzer ready");
    Ok(analyzer)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
