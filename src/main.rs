//! Adaptive Cache - HTTP cache server
//!
//! Serves the adaptive cache over a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::api::{create_router, AppState};
use adaptive_cache::cache::{
    CacheManager, DataSource, FileBackend, HttpSource, NoopSource, PersistenceBackend,
};
use adaptive_cache::config::Config;

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache, restoring persisted entries when enabled
/// 4. Warm configured keys and start the expiry sweep
/// 5. Serve the HTTP API until SIGINT/SIGTERM
/// 6. Flush pending persistence writes
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Adaptive Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_size_bytes={}, default_ttl={}s, port={}, sweep_interval={}s",
        config.max_size_bytes, config.default_ttl, config.server_port, config.sweep_interval
    );

    let source: Arc<dyn DataSource> = match &config.upstream_url {
        Some(url) => {
            info!("Using upstream data source at {}", url);
            Arc::new(HttpSource::new(url.clone())?)
        }
        None => Arc::new(NoopSource),
    };

    let cache = open_cache(&config, source).await;

    if !config.warm_keys.is_empty() {
        let loaded = cache.warm(&config.warm_keys).await;
        info!("Warmed {}/{} configured keys", loaded, config.warm_keys.len());
    }

    cache.start_sweeper(Duration::from_secs(config.sweep_interval));
    info!("Background expiry sweep started");

    let app = create_router(AppState::new(cache.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Opens the persistent cache when a directory is configured, falling back
/// to a purely in-memory cache if the directory is unusable.
async fn open_cache(config: &Config, source: Arc<dyn DataSource>) -> CacheManager {
    let Some(dir) = &config.persist_dir else {
        info!("Persistence disabled");
        return CacheManager::new(config, source);
    };

    match FileBackend::open(dir).await {
        Ok(backend) => {
            info!("Persisting entries to {}", dir.display());
            let backend: Arc<dyn PersistenceBackend> = Arc::new(backend);
            CacheManager::open(config, backend, source).await
        }
        Err(e) => {
            warn!(
                "Could not open persistence directory {}: {}; running in memory only",
                dir.display(),
                e
            );
            CacheManager::new(config, source)
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
