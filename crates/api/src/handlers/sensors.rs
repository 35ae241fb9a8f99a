use axum::extract::State;
use axum::Json;
use geowatch_events::protocol::SensorSnapshot;

use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/sensors/status
///
/// Last known value, status and quality of every tracked sensor.
pub async fn status(State(state): State<AppState>) -> Json<DataResponse<Vec<SensorSnapshot>>> {
    Json(DataResponse {
        data: state.ingestor.snapshot().await,
    })
}
