//! Periodic liveness sweep.
//!
//! Marks sensors offline once they have been silent longer than the
//! liveness window. The ingestor publishes the resulting offline alerts and
//! status events itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geowatch_pipeline::ReadingIngestor;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(ingestor: Arc<ReadingIngestor>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Liveness sweep started");

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Liveness sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let report = ingestor.sweep(Utc::now()).await;
                if report.offline.is_empty() {
                    tracing::trace!("Liveness sweep: all sensors reporting");
                } else {
                    tracing::warn!(
                        offline = report.offline.len(),
                        sensors = ?report.offline,
                        "Liveness sweep: sensors went offline",
                    );
                }
            }
        }
    }
}
