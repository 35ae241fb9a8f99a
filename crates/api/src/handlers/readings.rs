//! Handler for `POST /readings`.

use axum::extract::State;
use axum::Json;
use geowatch_core::sensor::Reading;
use geowatch_pipeline::BatchReport;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Largest batch accepted in one request.
const MAX_BATCH: usize = 5_000;

/// A single reading or an array of readings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReadingPayload {
    Batch(Vec<Reading>),
    Single(Reading),
}

/// POST /api/v1/readings
///
/// A single reading is rejected with its own error status. A batch is
/// processed reading by reading and always answers with the counts.
pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<ReadingPayload>,
) -> AppResult<Json<DataResponse<BatchReport>>> {
    let report = match payload {
        ReadingPayload::Single(reading) => {
            state.ingestor.ingest(reading).await?;
            BatchReport {
                accepted: 1,
                ..BatchReport::default()
            }
        }
        ReadingPayload::Batch(readings) => {
            if readings.len() > MAX_BATCH {
                return Err(AppError::BadRequest(format!(
                    "batch of {} readings exceeds the limit of {MAX_BATCH}",
                    readings.len()
                )));
            }
            let report = state.ingestor.ingest_batch(readings).await;
            if report.dropped > 0 {
                tracing::debug!(
                    accepted = report.accepted,
                    dropped = report.dropped,
                    "Reading batch partially rejected",
                );
            }
            report
        }
    };

    Ok(Json(DataResponse { data: report }))
}
