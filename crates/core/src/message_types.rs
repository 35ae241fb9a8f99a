//! WebSocket message type discriminators shared by the server, the broker
//! and the reconnecting client.

/// Server push: latest reading and derived status for one sensor.
pub const MSG_TYPE_LIVE_DATA: &str = "live_data";

/// Server push: alert lifecycle change.
pub const MSG_TYPE_ALERT: &str = "alert";

/// Server push: alert lifecycle change for a critical-severity alert.
pub const MSG_TYPE_CRITICAL_ALERT: &str = "critical_alert";

/// Server push: rockfall prediction for a site.
pub const MSG_TYPE_PREDICTION: &str = "prediction";

/// Server reply sent once after the socket is accepted.
pub const MSG_TYPE_SESSION_ESTABLISHED: &str = "session_established";

pub const MSG_TYPE_SUBSCRIPTION_CONFIRMED: &str = "subscription_confirmed";
pub const MSG_TYPE_UNSUBSCRIBED: &str = "unsubscribed";
pub const MSG_TYPE_LIVE_SNAPSHOT: &str = "live_snapshot";
pub const MSG_TYPE_PONG: &str = "pong";
pub const MSG_TYPE_ERROR: &str = "error";

/// Client requests.
pub const MSG_TYPE_SUBSCRIBE_ALERTS: &str = "subscribe_alerts";
pub const MSG_TYPE_SUBSCRIBE_LIVE_DATA: &str = "subscribe_live_data";
pub const MSG_TYPE_SUBSCRIBE_PREDICTIONS: &str = "subscribe_predictions";
pub const MSG_TYPE_UNSUBSCRIBE: &str = "unsubscribe";
pub const MSG_TYPE_GET_LIVE_DATA: &str = "get_live_data";
pub const MSG_TYPE_PING: &str = "ping";
pub const MSG_TYPE_DISCONNECT: &str = "disconnect";
