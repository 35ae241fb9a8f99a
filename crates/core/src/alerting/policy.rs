//! Configurable alerting policies: severity mapping and auto-resolve hysteresis.

use std::collections::HashMap;
use std::time::Duration;

use crate::alert::AlertSeverity;
use crate::error::CoreError;
use crate::sensor::{SensorType, Status};

/// Maps a breach status to an alert severity, per sensor type.
///
/// `critical` always maps to [`AlertSeverity::Critical`]. The severity of a
/// `warning` depends on how much lead time the sensor family usually gives
/// before a failure, so it is a lookup table rather than a fixed rule.
#[derive(Debug, Clone)]
pub struct SeverityPolicy {
    warning: HashMap<SensorType, AlertSeverity>,
    warning_fallback: AlertSeverity,
    offline: AlertSeverity,
}

impl SeverityPolicy {
    pub fn new(warning_fallback: AlertSeverity, offline: AlertSeverity) -> Self {
        Self {
            warning: HashMap::new(),
            warning_fallback,
            offline,
        }
    }

    /// Override the warning severity for one sensor type.
    pub fn with_warning(mut self, sensor_type: SensorType, severity: AlertSeverity) -> Self {
        self.warning.insert(sensor_type, severity);
        self
    }

    /// Severity for a status reported by a sensor of the given type.
    ///
    /// Returns `None` for statuses that do not raise a threshold alert.
    pub fn severity_for(&self, sensor_type: SensorType, status: Status) -> Option<AlertSeverity> {
        match status {
            Status::Critical => Some(AlertSeverity::Critical),
            Status::Warning => Some(
                self.warning
                    .get(&sensor_type)
                    .copied()
                    .unwrap_or(self.warning_fallback),
            ),
            Status::Normal | Status::Offline => None,
        }
    }

    /// Severity of the alert raised when a sensor goes offline.
    pub fn offline_severity(&self) -> AlertSeverity {
        self.offline
    }
}

impl Default for SeverityPolicy {
    /// Ground-movement sensors escalate a warning to `high`; weather and
    /// camera warnings are contextual and map to `medium`.
    fn default() -> Self {
        Self::new(AlertSeverity::High, AlertSeverity::Low)
            .with_warning(SensorType::Weather, AlertSeverity::Medium)
            .with_warning(SensorType::Camera, AlertSeverity::Medium)
    }
}

/// How long a condition must report `normal` before its alert auto-resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisPolicy {
    /// Consecutive `normal` observations required.
    pub confirmations: u32,
    /// Minimum time between the first of those observations and resolution.
    pub min_duration: Duration,
}

impl HysteresisPolicy {
    pub fn new(confirmations: u32, min_duration: Duration) -> Result<Self, CoreError> {
        if confirmations == 0 {
            return Err(CoreError::Validation(
                "hysteresis confirmations must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            confirmations,
            min_duration,
        })
    }
}

impl Default for HysteresisPolicy {
    fn default() -> Self {
        Self {
            confirmations: 3,
            min_duration: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_always_maps_to_critical() {
        let policy = SeverityPolicy::default();
        for t in [SensorType::Seismic, SensorType::Weather, SensorType::Camera] {
            assert_eq!(policy.severity_for(t, Status::Critical), Some(AlertSeverity::Critical));
        }
    }

    #[test]
    fn warning_uses_sensor_type_table() {
        let policy = SeverityPolicy::default();
        assert_eq!(
            policy.severity_for(SensorType::Tilt, Status::Warning),
            Some(AlertSeverity::High)
        );
        assert_eq!(
            policy.severity_for(SensorType::Weather, Status::Warning),
            Some(AlertSeverity::Medium)
        );
    }

    #[test]
    fn override_replaces_default_mapping() {
        let policy = SeverityPolicy::default().with_warning(SensorType::Tilt, AlertSeverity::Low);
        assert_eq!(
            policy.severity_for(SensorType::Tilt, Status::Warning),
            Some(AlertSeverity::Low)
        );
    }

    #[test]
    fn normal_and_offline_raise_no_threshold_severity() {
        let policy = SeverityPolicy::default();
        assert_eq!(policy.severity_for(SensorType::Strain, Status::Normal), None);
        assert_eq!(policy.severity_for(SensorType::Strain, Status::Offline), None);
    }

    #[test]
    fn zero_confirmations_is_rejected() {
        assert!(HysteresisPolicy::new(0, Duration::ZERO).is_err());
        assert!(HysteresisPolicy::new(1, Duration::ZERO).is_ok());
    }
}
