use axum::extract::{Path, State};
use axum::Json;
use geowatch_events::SessionStats;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/sessions/{id}
///
/// Queue depth, dropped-event counter and subscriptions of one session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<DataResponse<SessionStats>>> {
    let stats = state.broker.session_stats(&session_id).await?;
    Ok(Json(DataResponse { data: stats }))
}
