mod api;
mod clock;
mod config;
mod reaper;
mod registry;
mod resolver;
mod store;
mod store_manager;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::clock::SystemClock;
use crate::config::{Config, StoreBackend};
use crate::registry::Registry;
use crate::resolver::{DnsResolver, HostnameResolver, NoopResolver};
use crate::store::{memory::MemoryStore, sqlite::SqliteStore, RecordStore};
use crate::store_manager::StoreHandle;

const DEFAULT_CONFIG_PATH: &str = "/etc/metaserver/metaserverd.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metaserverd=info"))
        )
        .init();

    tracing::info!("Starting metaserverd");

    let config = load_config()?;

    // Open the record store and hand it to its own thread
    let backend: Box<dyn RecordStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            let db = SqliteStore::open(&config.store.db_path)?;
            tracing::info!("Opened database at {:?}", config.store.db_path);
            Box::new(db)
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store; registrations are lost on restart");
            Box::new(MemoryStore::new())
        }
    };
    let store = StoreHandle::spawn(backend);
    let stored = store.len().await.context("Failed to read store")?;
    tracing::info!("Store holds {} server records", stored);

    let resolver: Arc<dyn HostnameResolver> = if config.registry.resolve_hostnames {
        match DnsResolver::from_system_conf() {
            Ok(resolver) => Arc::new(resolver),
            Err(e) => {
                tracing::warn!("Hostname lookups disabled: {}", e);
                Arc::new(NoopResolver)
            }
        }
    } else {
        Arc::new(NoopResolver)
    };

    let registry = Registry::new(
        store.clone(),
        resolver,
        Arc::new(SystemClock),
        config.registry.clone(),
    );
    tracing::info!("Servers expire after {}s without a heartbeat", config.registry.timeout_secs);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let reaper_handle = if config.store.reap_enabled {
        let reaper_cancel = cancel.clone();
        let reaper_registry = registry.clone();
        let reaper_config = config.store.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = reaper::run(reaper_registry, reaper_config, reaper_cancel).await {
                tracing::error!("Reaper error: {}", e);
            }
        }))
    } else {
        None
    };

    // Build API router
    let app_state = api::routes::AppState {
        registry,
        trust_forwarded_for: config.api.trust_forwarded_for,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = server_handle.await;
    if let Some(handle) = reaper_handle {
        let _ = handle.await;
    }

    // Shutdown store thread last; in-flight requests have drained
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Config path from the first argument, else the default path if it exists,
/// else built-in defaults.
fn load_config() -> Result<Config> {
    if let Some(path) = std::env::args().nth(1) {
        let config = Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        tracing::info!("Loaded config from {}", path);
        return Ok(config);
    }

    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        let config = Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))?;
        tracing::info!("Loaded config from {}", DEFAULT_CONFIG_PATH);
        return Ok(config);
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}
