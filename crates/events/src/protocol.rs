//! JSON wire protocol spoken over the client WebSocket.
//!
//! Every frame is a JSON text message with a `type` discriminator. The
//! discriminator strings match the constants in
//! [`geowatch_core::message_types`].

use serde::{Deserialize, Serialize};

use geowatch_core::alert::{Alert, AlertAction, AlertSeverity, AlertTransition};
use geowatch_core::error::CoreError;
use geowatch_core::sensor::{QualityFlag, Status};
use geowatch_core::threshold_validation::validate_unit_range;
use geowatch_core::types::{SensorId, SiteId, Timestamp};

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Latest accepted reading of one sensor and its derived status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDataEvent {
    pub sensor_id: SensorId,
    pub site_id: SiteId,
    pub value: f64,
    pub unit: String,
    pub status: Status,
    pub quality_score: f64,
    pub timestamp: Timestamp,
}

/// An alert lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub action: AlertAction,
    pub alert: Alert,
}

impl AlertEvent {
    pub fn is_critical(&self) -> bool {
        self.alert.severity == AlertSeverity::Critical
    }
}

impl From<AlertTransition> for AlertEvent {
    fn from(t: AlertTransition) -> Self {
        Self {
            action: t.action,
            alert: t.alert,
        }
    }
}

/// Model-assigned risk category carried on predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Rockfall prediction for a site, produced by an external model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEvent {
    pub site_id: SiteId,
    /// Probability of a rockfall within the horizon, in [0, 1].
    pub probability: f64,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub timestamp: Timestamp,
}

impl PredictionEvent {
    pub fn check(&self) -> Result<(), CoreError> {
        if self.site_id.is_empty() {
            return Err(CoreError::Validation("siteId must not be empty".to_string()));
        }
        validate_unit_range(self.probability, "probability")
    }
}

/// Per-sensor state returned for `get_live_data` and `GET /sensors/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub sensor_id: SensorId,
    pub site_id: SiteId,
    /// `None` until the first reading or liveness verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value: Option<f64>,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Timestamp>,
    pub quality: QualityFlag,
    pub rejected_readings: u64,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Which outbound lane a message travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Telemetry. Oldest entry evicted when full.
    Live,
    /// Alerts, control replies and pings. Never evicted.
    Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    LiveData(LiveDataEvent),
    Alert(AlertEvent),
    CriticalAlert(AlertEvent),
    Prediction(PredictionEvent),
    SessionEstablished {
        session_id: String,
        resumed: bool,
        subscriptions: Vec<String>,
    },
    SubscriptionConfirmed {
        topic: String,
    },
    Unsubscribed {
        topic: String,
    },
    LiveSnapshot {
        sensors: Vec<SensorSnapshot>,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Wrap an alert event, choosing `critical_alert` for critical severity.
    pub fn alert(event: AlertEvent) -> Self {
        if event.is_critical() {
            ServerMessage::CriticalAlert(event)
        } else {
            ServerMessage::Alert(event)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn lane(&self) -> Lane {
        match self {
            ServerMessage::LiveData(_) | ServerMessage::Prediction(_) => Lane::Live,
            _ => Lane::Priority,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    SubscribeAlerts,
    /// Without a site id the subscription covers every site.
    SubscribeLiveData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site_id: Option<SiteId>,
    },
    SubscribePredictions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site_id: Option<SiteId>,
    },
    Unsubscribe {
        topic: String,
    },
    GetLiveData,
    Ping,
    Disconnect,
}
