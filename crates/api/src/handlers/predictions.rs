use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use geowatch_events::PredictionEvent;
use geowatch_pipeline::dispatch;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    /// Sessions the prediction was queued for.
    pub delivered: usize,
}

/// POST /api/v1/predictions
///
/// Fans a risk prediction out to `predictions:{siteId}` subscribers.
pub async fn publish(
    State(state): State<AppState>,
    Json(event): Json<PredictionEvent>,
) -> AppResult<(StatusCode, Json<DataResponse<PublishReceipt>>)> {
    event.check()?;

    let site_id = event.site_id.clone();
    let delivered = dispatch::publish_prediction(&state.broker, event).await;
    tracing::debug!(site_id = %site_id, delivered, "Prediction published");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PublishReceipt { delivered },
        }),
    ))
}
