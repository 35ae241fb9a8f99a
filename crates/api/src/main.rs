use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geowatch_api::config::ServerConfig;
use geowatch_api::router::build_app_router;
use geowatch_api::state::AppState;
use geowatch_api::{background, ws};
use geowatch_pipeline::{CachedRegistry, InMemoryRegistry, SensorRegistry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geowatch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Sensor registry ---
    let registry = match &config.sensor_registry_path {
        Some(path) => InMemoryRegistry::from_json_file(path)
            .await
            .expect("Failed to load sensor registry"),
        None => {
            tracing::warn!("SENSOR_REGISTRY_PATH not set, starting with an empty registry");
            InMemoryRegistry::default()
        }
    };
    tracing::info!(sensors = registry.len().await, "Sensor registry loaded");

    let registry: Arc<dyn SensorRegistry> = Arc::new(CachedRegistry::new(
        registry,
        Duration::from_secs(config.registry_cache_ttl_secs),
    ));

    // --- App state ---
    let state = AppState::new(config.clone(), registry);

    let tracked = state
        .ingestor
        .prime(Utc::now())
        .await
        .expect("Failed to prime liveness tracking");
    tracing::info!(tracked, "Liveness tracking primed");

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&state.broker),
        Duration::from_secs(config.heartbeat_interval_secs),
        cancel.clone(),
    );

    let sweep_handle = tokio::spawn(background::liveness_sweep::run(
        Arc::clone(&state.ingestor),
        Duration::from_secs(config.liveness_sweep_interval_secs),
        cancel.clone(),
    ));

    let broker = Arc::clone(&state.broker);

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let _ = tokio::time::timeout(grace, sweep_handle).await;
    let _ = tokio::time::timeout(grace, heartbeat_handle).await;
    tracing::info!("Background tasks stopped");

    let sessions = broker.session_count().await;
    tracing::info!(sessions, "Closing remaining WebSocket sessions");
    broker.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
