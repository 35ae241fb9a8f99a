use axum::routing::get;
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/sessions`.
///
/// ```text
/// GET    /{id}                      -> get_session
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(sessions::get_session))
}
