use std::sync::Arc;

use geowatch_core::alerting::{AlertStateMachine, SeverityPolicy};
use geowatch_events::TopicBroker;
use geowatch_pipeline::{ReadingIngestor, SensorRegistry};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Sensor registry (already wrapped in the read-through cache).
    pub registry: Arc<dyn SensorRegistry>,
    /// Owner of every alert's lifecycle.
    pub alerts: Arc<AlertStateMachine>,
    /// Session table and topic fan-out.
    pub broker: Arc<TopicBroker>,
    pub ingestor: Arc<ReadingIngestor>,
}

impl AppState {
    /// Wire the real-time core from configuration and a registry.
    pub fn new(config: ServerConfig, registry: Arc<dyn SensorRegistry>) -> Self {
        let alerts = Arc::new(
            AlertStateMachine::new(SeverityPolicy::default(), config.hysteresis())
                .with_history_limit(config.alert_history_limit),
        );
        let broker = Arc::new(TopicBroker::new(config.broker_config()));
        let ingestor = Arc::new(ReadingIngestor::new(
            Arc::clone(&registry),
            Arc::clone(&alerts),
            Arc::clone(&broker),
            config.ingest_config(),
        ));

        Self {
            config: Arc::new(config),
            registry,
            alerts,
            broker,
            ingestor,
        }
    }
}
