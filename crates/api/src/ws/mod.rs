mod handler;
mod heartbeat;

pub use handler::{dispatch_client_message, ws_handler, WsQuery};
pub use heartbeat::start_heartbeat;
