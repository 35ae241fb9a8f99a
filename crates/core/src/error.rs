use crate::types::AlertId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Threshold configuration where `critical < max` or a bound is not finite.
    #[error("Invalid threshold for sensor {sensor_id}: max={max}, critical={critical}")]
    InvalidThreshold {
        sensor_id: String,
        max: f64,
        critical: f64,
    },

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Reading rejected before classification (non-finite, out of range, bad quality).
    #[error("Invalid reading from sensor {sensor_id}: {reason}")]
    InvalidReading { sensor_id: String, reason: String },

    /// Operator action not permitted from the alert's current state.
    #[error("Cannot {action} alert {alert_id}: {reason}")]
    InvalidTransition {
        alert_id: AlertId,
        action: &'static str,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
