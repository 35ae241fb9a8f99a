//! Threshold evaluation for sensor readings.
//!
//! Pure logic. The caller resolves the sensor's threshold from the registry
//! and passes it in; nothing here holds state between calls.

use crate::error::CoreError;
use crate::sensor::{Reading, Status, Threshold};

/// Classify a reading against its sensor's threshold.
///
/// The critical bound is checked first so a value equal to a bound always
/// lands in the stricter bucket. Never returns [`Status::Offline`].
pub fn classify(reading: &Reading, threshold: &Threshold) -> Result<Status, CoreError> {
    classify_value(&reading.sensor_id, reading.value, threshold)
}

/// Classify a raw value. See [`classify`].
pub fn classify_value(sensor_id: &str, value: f64, threshold: &Threshold) -> Result<Status, CoreError> {
    threshold.validate(sensor_id)?;

    let status = if value >= threshold.critical {
        Status::Critical
    } else if value >= threshold.max {
        Status::Warning
    } else {
        Status::Normal
    };
    Ok(status)
}
