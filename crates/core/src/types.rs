/// Sensor identifiers are opaque strings assigned at provisioning time.
pub type SensorId = String;

/// Geological site identifier (owner of a group of sensors).
pub type SiteId = String;

/// Alert identifiers are UUID v7 (time-ordered).
pub type AlertId = uuid::Uuid;

/// Operator identifier supplied with acknowledge/resolve actions.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
