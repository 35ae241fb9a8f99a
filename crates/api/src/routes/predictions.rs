use axum::routing::post;
use axum::Router;

use crate::handlers::predictions;
use crate::state::AppState;

/// Routes mounted at `/predictions`.
///
/// ```text
/// POST   /                          -> publish
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(predictions::publish))
}
