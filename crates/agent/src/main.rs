//! `geowatch-agent` -- watches a GeoWatch server's alert and telemetry feed.
//!
//! Keeps one WebSocket session alive with reconnect and backoff, and logs
//! every alert, prediction and sensor status change it receives.
//! See [`AgentConfig::from_env`] for the environment variables.

use geowatch_agent::config::AgentConfig;
use geowatch_agent::{ConnectionManager, ConnectionState};
use geowatch_events::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geowatch_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });

    tracing::info!(
        ws_url = %config.ws_url,
        sites = ?config.sites,
        max_attempts = config.backoff.max_attempts,
        "Starting geowatch-agent",
    );

    let manager = ConnectionManager::new(
        config.ws_url.clone(),
        config.backoff.clone(),
        config.subscriptions(),
    );
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();

    let runner = tokio::spawn(manager.run(tx, cancel.clone()));

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c.cancel();
        }
    });

    while let Some(message) = rx.recv().await {
        log_message(&message);
    }

    match runner.await {
        Ok(ConnectionState::Disconnected) if !cancel.is_cancelled() => {
            tracing::error!("Connection permanently lost");
            std::process::exit(2);
        }
        Ok(state) => tracing::info!(?state, "Agent stopped"),
        Err(e) => tracing::error!(error = %e, "Connection task failed"),
    }
}

fn log_message(message: &ServerMessage) {
    match message {
        ServerMessage::CriticalAlert(event) => tracing::error!(
            action = ?event.action,
            alert_id = %event.alert.id,
            sensor_id = %event.alert.sensor_id,
            site_id = %event.alert.site_id,
            "{}",
            event.alert.title,
        ),
        ServerMessage::Alert(event) => tracing::warn!(
            action = ?event.action,
            alert_id = %event.alert.id,
            sensor_id = %event.alert.sensor_id,
            severity = event.alert.severity.as_str(),
            "{}",
            event.alert.title,
        ),
        ServerMessage::Prediction(p) => tracing::info!(
            site_id = %p.site_id,
            probability = p.probability,
            risk_level = ?p.risk_level,
            "Risk prediction",
        ),
        ServerMessage::LiveData(ev) => tracing::debug!(
            sensor_id = %ev.sensor_id,
            value = ev.value,
            status = ev.status.as_str(),
            "Live reading",
        ),
        ServerMessage::Error { message } => tracing::warn!(%message, "Server reported an error"),
        other => tracing::debug!(?other, "Control message"),
    }
}
