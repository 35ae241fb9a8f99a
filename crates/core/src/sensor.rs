//! Sensor provisioning records, readings and the derived status.
//!
//! Sensors are owned by the external registry and never mutated here.
//! Readings arrive on the ingestion path and are validated against the
//! sensor they claim to come from before classification.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::threshold_validation::{validate_threshold_bounds, validate_unit_range};
use crate::types::{SensorId, SiteId, Timestamp};

/// Physical sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Seismic,
    Tilt,
    Strain,
    Weather,
    Camera,
    Laser,
}

impl SensorType {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorType::Seismic => "seismic",
            SensorType::Tilt => "tilt",
            SensorType::Strain => "strain",
            SensorType::Weather => "weather",
            SensorType::Camera => "camera",
            SensorType::Laser => "laser",
        }
    }
}

/// Warning (`max`) and critical bounds for a sensor's value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub max: f64,
    pub critical: f64,
}

impl Threshold {
    /// Reject bounds that are not finite or where `critical < max`.
    pub fn validate(&self, sensor_id: &str) -> Result<(), CoreError> {
        validate_threshold_bounds(sensor_id, self.max, self.critical)
    }
}

/// Physically plausible value range. Readings outside it are treated as
/// instrument faults, not as breaches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A provisioned sensor as known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    #[validate(length(min = 1, max = 128))]
    pub id: SensorId,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    #[validate(length(min = 1, max = 32))]
    pub unit: String,
    pub threshold: Threshold,
    #[validate(length(min = 1, max = 128))]
    pub site_id: SiteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<ValidRange>,
}

impl Sensor {
    /// Check a provisioning record before it is admitted to a registry.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(format!("sensor {}: {e}", self.id)))?;
        self.threshold.validate(&self.id)?;
        if let Some(range) = &self.valid_range {
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(CoreError::Validation(format!(
                    "sensor {}: valid range [{}, {}] is empty or not finite",
                    self.id, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}

/// One measurement reported by a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_id: SensorId,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    pub timestamp: Timestamp,
    pub quality_score: f64,
}

impl Reading {
    /// Validate this reading against the sensor it claims to come from.
    ///
    /// An empty unit is accepted and means "the sensor's provisioned unit".
    pub fn check_against(&self, sensor: &Sensor) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidReading {
            sensor_id: self.sensor_id.clone(),
            reason,
        };

        if !self.value.is_finite() {
            return Err(invalid(format!("value {} is not finite", self.value)));
        }
        if let Some(range) = &sensor.valid_range {
            if !range.contains(self.value) {
                return Err(invalid(format!(
                    "value {} outside physical range [{}, {}]",
                    self.value, range.min, range.max
                )));
            }
        }
        validate_unit_range(self.quality_score, "qualityScore").map_err(|e| invalid(e.to_string()))?;
        if !self.unit.is_empty() && !self.unit.eq_ignore_ascii_case(&sensor.unit) {
            return Err(invalid(format!(
                "unit '{}' does not match provisioned unit '{}'",
                self.unit, sensor.unit
            )));
        }
        Ok(())
    }
}

/// Derived classification of a sensor's latest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warning,
    Critical,
    /// Assigned by the liveness sweep only.
    Offline,
}

impl Status {
    pub fn is_breach(self) -> bool {
        matches!(self, Status::Warning | Status::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Warning => "warning",
            Status::Critical => "critical",
            Status::Offline => "offline",
        }
    }
}

/// Data-quality flag kept per sensor by the ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    Good,
    /// The most recent reading was rejected by validation.
    Degraded,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn sensor() -> Sensor {
        Sensor {
            id: "S1".into(),
            sensor_type: SensorType::Tilt,
            unit: "mm".into(),
            threshold: Threshold {
                max: 10.0,
                critical: 20.0,
            },
            site_id: "site-a".into(),
            valid_range: Some(ValidRange {
                min: -100.0,
                max: 100.0,
            }),
        }
    }

    fn reading(value: f64) -> Reading {
        Reading {
            sensor_id: "S1".into(),
            value,
            unit: "mm".into(),
            timestamp: Utc::now(),
            quality_score: 0.9,
        }
    }

    #[test]
    fn provisioned_sensor_passes_check() {
        assert!(sensor().check().is_ok());
    }

    #[test]
    fn sensor_with_empty_id_fails_validation() {
        let mut s = sensor();
        s.id = String::new();
        assert_matches!(s.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn sensor_with_inverted_threshold_fails_check() {
        let mut s = sensor();
        s.threshold = Threshold {
            max: 30.0,
            critical: 5.0,
        };
        assert_matches!(s.check(), Err(CoreError::InvalidThreshold { .. }));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        assert_matches!(
            reading(f64::NAN).check_against(&sensor()),
            Err(CoreError::InvalidReading { .. })
        );
        assert_matches!(
            reading(f64::INFINITY).check_against(&sensor()),
            Err(CoreError::InvalidReading { .. })
        );
    }

    #[test]
    fn out_of_physical_range_value_is_rejected() {
        assert_matches!(
            reading(250.0).check_against(&sensor()),
            Err(CoreError::InvalidReading { .. })
        );
    }

    #[test]
    fn quality_outside_unit_range_is_rejected() {
        let mut r = reading(5.0);
        r.quality_score = 1.5;
        assert_matches!(r.check_against(&sensor()), Err(CoreError::InvalidReading { .. }));
    }

    #[test]
    fn unit_mismatch_is_rejected_but_empty_unit_is_accepted() {
        let mut r = reading(5.0);
        r.unit = "deg".into();
        assert!(r.check_against(&sensor()).is_err());
        r.unit = String::new();
        assert!(r.check_against(&sensor()).is_ok());
    }

    #[test]
    fn reading_deserializes_from_wire_format() {
        let r: Reading = serde_json::from_str(
            r#"{"sensorId":"S1","value":12.5,"unit":"mm","timestamp":"2026-01-01T00:00:00Z","qualityScore":0.8}"#,
        )
        .expect("valid reading json");
        assert_eq!(r.sensor_id, "S1");
        assert_eq!(r.value, 12.5);
        assert_eq!(r.quality_score, 0.8);
    }

    #[test]
    fn sensor_type_serializes_lowercase() {
        let json = serde_json::to_value(sensor()).expect("serializable");
        assert_eq!(json["type"], "tilt");
        assert_eq!(json["siteId"], "site-a");
    }
}
