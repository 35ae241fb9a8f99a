//! Reading ingestion and sensor liveness.
//!
//! Each reading is resolved against the registry, validated, classified and
//! published as live data. Status changes (and normal readings while a
//! threshold alert awaits confirmation) are forwarded to the alert state
//! machine. Readings for one sensor are serialized through a per-sensor
//! async mutex; unrelated sensors never contend.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use geowatch_core::alert::{AlertCondition, AlertTransition};
use geowatch_core::alerting::AlertStateMachine;
use geowatch_core::error::CoreError;
use geowatch_core::sensor::{QualityFlag, Reading, Sensor, Status};
use geowatch_core::threshold::classify;
use geowatch_core::types::{SensorId, Timestamp};
use geowatch_events::protocol::{LiveDataEvent, SensorSnapshot};
use geowatch_events::TopicBroker;

use crate::dispatch;
use crate::registry::SensorRegistry;

/// Default silence after which a sensor is considered offline.
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub liveness_window: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            liveness_window: DEFAULT_LIVENESS_WINDOW,
        }
    }
}

/// Result of one accepted reading.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub event: LiveDataEvent,
    pub transitions: Vec<AlertTransition>,
}

/// A reading dropped from a batch.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedReading {
    pub sensor_id: SensorId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub accepted: usize,
    pub dropped: usize,
    pub rejected: Vec<RejectedReading>,
}

/// Sensors newly marked offline by one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub offline: Vec<SensorId>,
    pub transitions: Vec<AlertTransition>,
}

#[derive(Debug)]
struct SensorState {
    sensor: Sensor,
    status: Option<Status>,
    last_value: Option<f64>,
    last_quality_score: f64,
    /// Arrival time of the last reading, or when tracking started.
    last_seen: Timestamp,
    last_reading_at: Option<Timestamp>,
    quality: QualityFlag,
    rejected: u64,
}

impl SensorState {
    fn new(sensor: Sensor, now: Timestamp) -> Self {
        Self {
            sensor,
            status: None,
            last_value: None,
            last_quality_score: 0.0,
            last_seen: now,
            last_reading_at: None,
            quality: QualityFlag::Good,
            rejected: 0,
        }
    }

    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            sensor_id: self.sensor.id.clone(),
            site_id: self.sensor.site_id.clone(),
            status: self.status,
            last_value: self.last_value,
            unit: self.sensor.unit.clone(),
            last_seen: self.last_reading_at,
            quality: self.quality,
            rejected_readings: self.rejected,
        }
    }
}

type SensorSlot = Arc<Mutex<SensorState>>;

pub struct ReadingIngestor {
    registry: Arc<dyn SensorRegistry>,
    alerts: Arc<AlertStateMachine>,
    broker: Arc<TopicBroker>,
    states: DashMap<SensorId, SensorSlot>,
    liveness_window: TimeDelta,
}

impl ReadingIngestor {
    pub fn new(
        registry: Arc<dyn SensorRegistry>,
        alerts: Arc<AlertStateMachine>,
        broker: Arc<TopicBroker>,
        config: IngestConfig,
    ) -> Self {
        Self {
            registry,
            alerts,
            broker,
            states: DashMap::new(),
            liveness_window: TimeDelta::from_std(config.liveness_window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub async fn ingest(&self, reading: Reading) -> Result<IngestOutcome, CoreError> {
        self.ingest_at(reading, Utc::now()).await
    }

    /// Ingest with an explicit arrival time.
    pub async fn ingest_at(&self, reading: Reading, now: Timestamp) -> Result<IngestOutcome, CoreError> {
        let Some(sensor) = self.registry.get_sensor(&reading.sensor_id).await? else {
            tracing::warn!(sensor_id = %reading.sensor_id, "Reading from unknown sensor dropped");
            return Err(CoreError::UnknownSensor(reading.sensor_id));
        };

        let slot = self.slot_for(&sensor, now);
        let mut state = slot.lock().await;
        state.sensor = sensor.clone();

        if let Err(e) = reading.check_against(&sensor) {
            state.quality = QualityFlag::Degraded;
            state.rejected += 1;
            tracing::warn!(
                sensor_id = %sensor.id,
                rejected = state.rejected,
                error = %e,
                "Reading rejected",
            );
            return Err(e);
        }

        let status = classify(&reading, &sensor.threshold).inspect_err(|e| {
            tracing::error!(sensor_id = %sensor.id, error = %e, "Sensor threshold misconfigured");
        })?;

        let previous = state.status.replace(status);
        state.last_value = Some(reading.value);
        state.last_quality_score = reading.quality_score;
        state.last_seen = now;
        state.last_reading_at = Some(reading.timestamp);
        state.quality = QualityFlag::Good;

        let awaiting_confirmation =
            status == Status::Normal && self.alerts.is_open(&sensor.id, AlertCondition::Threshold);
        let transitions = if previous != Some(status) || awaiting_confirmation {
            if previous != Some(status) {
                tracing::debug!(
                    sensor_id = %sensor.id,
                    from = previous.map(Status::as_str),
                    to = status.as_str(),
                    "Sensor status changed",
                );
            }
            self.alerts.observe(&sensor, status, reading.value, now)?
        } else {
            Vec::new()
        };

        let event = LiveDataEvent {
            sensor_id: sensor.id.clone(),
            site_id: sensor.site_id.clone(),
            value: reading.value,
            unit: sensor.unit.clone(),
            status,
            quality_score: reading.quality_score,
            timestamp: reading.timestamp,
        };
        dispatch::publish_live(&self.broker, event.clone()).await;
        dispatch::publish_transitions(&self.broker, &transitions).await;
        drop(state);

        Ok(IngestOutcome { event, transitions })
    }

    /// Ingest readings one by one; failures are isolated per reading.
    pub async fn ingest_batch(&self, readings: Vec<Reading>) -> BatchReport {
        let mut report = BatchReport::default();
        for reading in readings {
            let sensor_id = reading.sensor_id.clone();
            match self.ingest(reading).await {
                Ok(_) => report.accepted += 1,
                Err(e) => {
                    report.dropped += 1;
                    report.rejected.push(RejectedReading {
                        sensor_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Start liveness tracking for every provisioned sensor, so sensors that
    /// never report are still detected. Returns the number of sensors tracked.
    pub async fn prime(&self, now: Timestamp) -> Result<usize, CoreError> {
        let sensors = self.registry.all_sensors().await?;
        for sensor in sensors {
            self.slot_for(&sensor, now);
        }
        Ok(self.states.len())
    }

    /// Mark every sensor silent past the liveness window as offline, once per
    /// silence episode.
    pub async fn sweep(&self, now: Timestamp) -> SweepReport {
        let mut report = SweepReport::default();
        for slot in self.slots() {
            let mut state = slot.lock().await;
            if state.status == Some(Status::Offline) {
                continue;
            }
            if now.signed_duration_since(state.last_seen) <= self.liveness_window {
                continue;
            }

            state.status = Some(Status::Offline);
            let sensor = state.sensor.clone();
            let value = state.last_value.unwrap_or_default();
            tracing::warn!(
                sensor_id = %sensor.id,
                last_seen = %state.last_seen,
                "Sensor offline",
            );

            let transitions = match self.alerts.observe(&sensor, Status::Offline, value, now) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(sensor_id = %sensor.id, error = %e, "Failed to raise offline alert");
                    Vec::new()
                }
            };

            let event = LiveDataEvent {
                sensor_id: sensor.id.clone(),
                site_id: sensor.site_id.clone(),
                value,
                unit: sensor.unit.clone(),
                status: Status::Offline,
                quality_score: state.last_quality_score,
                timestamp: now,
            };
            dispatch::publish_live(&self.broker, event).await;
            dispatch::publish_transitions(&self.broker, &transitions).await;

            report.offline.push(sensor.id);
            report.transitions.extend(transitions);
        }
        report
    }

    /// Latest known state of every tracked sensor, ordered by sensor id.
    pub async fn snapshot(&self) -> Vec<SensorSnapshot> {
        let mut out = Vec::with_capacity(self.states.len());
        for slot in self.slots() {
            out.push(slot.lock().await.snapshot());
        }
        out.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        out
    }

    pub fn tracked_sensors(&self) -> usize {
        self.states.len()
    }

    fn slot_for(&self, sensor: &Sensor, now: Timestamp) -> SensorSlot {
        self.states
            .entry(sensor.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SensorState::new(sensor.clone(), now))))
            .clone()
    }

    /// Clone the slot handles out so no map guard is held across an await.
    fn slots(&self) -> Vec<SensorSlot> {
        self.states.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}
