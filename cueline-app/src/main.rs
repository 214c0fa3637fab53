//! Composition root: loads configuration, wires every collaborator crate
//! together by hand (no global singletons — every `Arc` is built once here
//! and threaded to whoever needs it), then serves HTTP until interrupted.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use cueline_core::EventBus;
use cueline_download::Downloader;
use cueline_orchestrator::Orchestrator;
use cueline_player::PlayerAdapter;
use cueline_queue::QueueManager;
use cueline_repository::{Repository, SqliteRepository};
use cueline_resolver::{DirectUrlResolver, Resolver};
use cueline_server::AppState;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(err) = run().await {
        error!("fatal startup error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "cueline.toml".to_string());
    let config = config::load(&PathBuf::from(&config_path))?;
    info!(path = %config_path, "loaded configuration");

    let bus = EventBus::new();

    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::open(&config.database_path)?);
    info!(path = %config.database_path.display(), "opened repository");

    let cache_dir = config
        .database_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("cache");
    std::fs::create_dir_all(&cache_dir)?;
    let resolver: Arc<dyn Resolver> = Arc::new(DirectUrlResolver::new(cache_dir.clone()));

    let downloader = Arc::new(Downloader::new(
        resolver.clone(),
        config.download.concurrency,
        config.download.retry_policy(),
        bus.clone(),
    ));

    let adapter: Arc<dyn PlayerAdapter> = match cueline_player::select_adapter(
        &config.player.seamless_executable,
        &config.player.restart_executable,
    ) {
        Ok(adapter) => Arc::from(adapter),
        Err(err) => {
            return Err(anyhow::anyhow!("no player backend available: {err}"));
        }
    };
    info!(backend = adapter.name(), "selected player backend");

    let queue = Arc::new(QueueManager::new(bus.clone()));
    let persisted_queue = repository.load_queue().await?;

    let mut protected: std::collections::HashSet<PathBuf> = persisted_queue
        .iter()
        .filter_map(|item| match &item.download_state {
            cueline_core::DownloadState::Ready(path) => Some(PathBuf::from(path)),
            _ => None,
        })
        .collect();
    if let Some(snapshot) = repository.load_playback_snapshot().await? {
        if let Some(path) = snapshot.current_file_path {
            protected.insert(PathBuf::from(path));
        }
    }
    match cueline_download::sweep::sweep(&cache_dir, &protected).await {
        Ok(removed) if removed > 0 => info!(removed, "swept orphaned cache files on startup"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "startup cache sweep failed"),
    }

    queue.restore(persisted_queue).await;

    let orchestrator = Orchestrator::new(
        queue.clone(),
        downloader.clone(),
        adapter,
        repository.clone(),
        bus.clone(),
        config.download.lookahead,
    );
    orchestrator.recover().await?;
    orchestrator.spawn();
    info!("orchestrator recovered and running");

    let state = Arc::new(AppState::new(
        queue,
        orchestrator.clone(),
        resolver,
        downloader,
        repository,
        bus,
        config.broadcast.into(),
    ));

    let bind_addr: std::net::SocketAddr = config.server.bind_addr.parse()?;
    let app = cueline_server::build(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    orchestrator.shutdown().await;
    warn!("cueline stopped");
    Ok(())
}
