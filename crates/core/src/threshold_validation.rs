//! Shared range and threshold validation helpers.
//!
//! Used by the threshold evaluator, reading validation and registry loading.

use crate::error::CoreError;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Validation` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate a `{max, critical}` threshold pair for a sensor.
///
/// Both bounds must be finite and `critical` must not be below `max`.
/// Equal bounds are accepted: every breach is then critical.
pub fn validate_threshold_bounds(sensor_id: &str, max: f64, critical: f64) -> Result<(), CoreError> {
    if !max.is_finite() || !critical.is_finite() || critical < max {
        return Err(CoreError::InvalidThreshold {
            sensor_id: sensor_id.to_string(),
            max,
            critical,
        });
    }
    Ok(())
}
