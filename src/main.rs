//! Tablecache - A key/value cache stored in a single SQL table
//!
//! HTTP server exposing one cache table of a SQLite database.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablecache::api::{create_router, AppState};
use tablecache::{Config, CullTask};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache table and check the settings
/// 4. Start the background cull task if an interval is configured
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablecache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tablecache server");

    // Load configuration from environment variables
    let config = Config::from_env();
    info!(
        "Configuration loaded: database={}, table={}, max_entries={}, port={}, cull_interval={}s",
        config.database_path.display(),
        config.cache.location,
        config.cache.options.max_entries,
        config.server_port,
        config.cull_interval
    );

    // Create the table once; request connections only attach to it
    let state = AppState::from_config(&config);
    let bootstrap = state.clone();
    tokio::task::spawn_blocking(move || bootstrap.bootstrap())
        .await
        .context("bootstrap task failed")?
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    info!("Cache table ready");

    let cull_task = (config.cull_interval > 0).then(|| {
        CullTask::start(
            config.database_path.clone(),
            state.settings.clone(),
            state.registry.clone(),
            config.cull_interval,
        )
    });

    // Create router with all endpoints
    let app = create_router(state);

    // Bind to configured port
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(task) = cull_task {
        task.stop().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
