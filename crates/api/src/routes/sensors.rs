use axum::routing::get;
use axum::Router;

use crate::handlers::sensors;
use crate::state::AppState;

/// Routes mounted at `/sensors`.
///
/// ```text
/// GET    /status                    -> status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(sensors::status))
}
