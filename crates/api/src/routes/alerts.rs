//! Route definitions for the `/alerts` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::alerts;
use crate::state::AppState;

/// Routes mounted at `/alerts`.
///
/// ```text
/// GET    /                          -> list_active
/// GET    /history                   -> history
/// GET    /stats                     -> stats
/// GET    /{id}                      -> get_alert
/// PUT    /{id}/acknowledge          -> acknowledge
/// PUT    /{id}/resolve              -> resolve
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(alerts::list_active))
        .route("/history", get(alerts::history))
        .route("/stats", get(alerts::stats))
        .route("/{id}", get(alerts::get_alert))
        .route("/{id}/acknowledge", put(alerts::acknowledge))
        .route("/{id}/resolve", put(alerts::resolve))
}
