//! Alert lifecycle: severity policy, hysteresis, state machine and stats.

pub mod machine;
pub mod policy;
pub mod stats;

pub use machine::{AlertFilter, AlertStateMachine, DEFAULT_HISTORY_LIMIT};
pub use policy::{HysteresisPolicy, SeverityPolicy};
pub use stats::{AlertStats, SeverityBreakdown};
