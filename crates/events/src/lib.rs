//! GeoWatch real-time fan-out.
//!
//! - [`protocol`]: JSON messages exchanged with WebSocket clients.
//! - [`Topic`]: `alerts`, `live_data:{site}`, `predictions:{site}`.
//! - [`SessionQueue`]: bounded two-lane outbound queue per session.
//! - [`TopicBroker`]: session table, subscriptions and publish.

pub mod broker;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod topic;

pub use broker::{BrokerConfig, BrokerError, Connection, HeartbeatReport, TopicBroker};
pub use protocol::{AlertEvent, ClientMessage, LiveDataEvent, PredictionEvent, ServerMessage};
pub use queue::{Outbound, PushOutcome, SessionQueue};
pub use session::{SessionId, SessionStats};
pub use topic::Topic;
