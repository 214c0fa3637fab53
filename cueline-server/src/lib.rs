//! HTTP + SSE front door (spec.md §6). Wires the already-assembled core
//! collaborators (queue, orchestrator, resolver, downloader, repository,
//! event bus) into an axum `Router`, and runs the status broadcaster that
//! feeds every `/api/status/stream` subscriber.

pub mod error;
pub mod routes;
pub mod sse;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use cueline_download::Downloader;
use cueline_orchestrator::Orchestrator;
use cueline_queue::QueueManager;
use cueline_repository::Repository;
use cueline_resolver::Resolver;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub use error::ApiError;
pub use sse::BroadcastConfig;

/// Shared state handed to every axum handler and to the broadcaster task.
pub struct AppState {
    pub queue: Arc<QueueManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub resolver: Arc<dyn Resolver>,
    pub downloader: Arc<Downloader>,
    pub repository: Arc<dyn Repository>,
    pub bus: cueline_core::EventBus,
    pub started_at: Instant,
    pub broadcast_config: BroadcastConfig,
    pub broadcast_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(
        queue: Arc<QueueManager>,
        orchestrator: Arc<Orchestrator>,
        resolver: Arc<dyn Resolver>,
        downloader: Arc<Downloader>,
        repository: Arc<dyn Repository>,
        bus: cueline_core::EventBus,
        broadcast_config: BroadcastConfig,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(64);
        Self {
            queue,
            orchestrator,
            resolver,
            downloader,
            repository,
            bus,
            started_at: Instant::now(),
            broadcast_config,
            broadcast_tx,
        }
    }
}

/// Builds the router and spawns the status broadcaster. The composition
/// root then hands the router to its own `axum::serve` call so it retains
/// control of the listener and shutdown signal.
pub fn build(state: Arc<AppState>) -> axum::Router {
    tokio::spawn(sse::run_broadcaster(state.clone(), state.broadcast_tx.clone()));
    routes::router(state)
}

/// Convenience entry point for the common case: bind and serve until the
/// process is killed. `cueline-app` uses this directly; tests use
/// `routes::router` against an in-memory `AppState` instead.
pub async fn serve(state: Arc<AppState>, bind_addr: SocketAddr) -> std::io::Result<()> {
    let app = build(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await
}
