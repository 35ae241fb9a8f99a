pub mod alerts;
pub mod health;
pub mod predictions;
pub mod readings;
pub mod sensors;
pub mod sessions;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws?sessionId=                                   WebSocket (resume with sessionId)
///
/// /readings                                        ingest one reading or a batch (POST)
///
/// /alerts                                          active alerts (siteId, severity)
/// /alerts/history                                  resolved alerts, newest first
/// /alerts/stats                                    counts over the last `days`
/// /alerts/{id}                                     get
/// /alerts/{id}/acknowledge                         acknowledge (PUT)
/// /alerts/{id}/resolve                             resolve (PUT)
///
/// /sensors/status                                  liveness snapshot
///
/// /predictions                                     publish a risk prediction (POST)
///
/// /sessions/{id}                                   session queue stats
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/readings", readings::router())
        .nest("/alerts", alerts::router())
        .nest("/sensors", sensors::router())
        .nest("/predictions", predictions::router())
        .nest("/sessions", sessions::router())
}
