//! Domain types and pure logic for geological site monitoring.
//!
//! Everything here is synchronous and transport-free: sensors and readings,
//! threshold classification, and the alert lifecycle state machine.

pub mod alert;
pub mod alerting;
pub mod error;
pub mod message_types;
pub mod sensor;
pub mod threshold;
pub mod threshold_validation;
pub mod types;
