//! `geowatch-agent` library crate.
//!
//! Client-side connection management for the GeoWatch WebSocket feed.
//! The binary entrypoint lives in `main.rs`.

pub mod config;
pub mod connection;
pub mod reconnect;

pub use connection::ConnectionManager;
pub use reconnect::{BackoffPolicy, ConnectionState, ReconnectMachine};
