use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geowatch_events::TopicBroker;
use tokio_util::sync::CancellationToken;

/// Spawn a background task that pings every attached session and prunes
/// stale or expired ones.
///
/// Runs until `cancel` fires.
pub fn start_heartbeat(
    broker: Arc<TopicBroker>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so fresh
        // connections are not pinged at startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = broker.heartbeat_tick(Utc::now()).await;
                    tracing::debug!(
                        pinged = report.pinged,
                        stale = report.stale.len(),
                        expired = report.expired.len(),
                        "WebSocket heartbeat",
                    );
                }
            }
        }
    })
}
