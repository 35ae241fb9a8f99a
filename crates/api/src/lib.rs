//! HTTP and WebSocket surface of the GeoWatch monitoring core.
//!
//! Exposed as a library so integration tests can build the same router
//! the binary serves.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
