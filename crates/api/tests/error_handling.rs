//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server is
//! involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use geowatch_api::error::AppError;
use geowatch_core::error::CoreError;
use geowatch_events::BrokerError;
use http_body_util::BodyExt;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Alert",
        id: "42".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Alert with id 42 not found");
}

// ---------------------------------------------------------------------------
// Test: InvalidTransition maps to 409 with INVALID_TRANSITION code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_transition_returns_409() {
    let err = AppError::Core(CoreError::InvalidTransition {
        alert_id: uuid::Uuid::nil(),
        action: "acknowledge",
        reason: "alert is already resolved".into(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_TRANSITION");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("already resolved"));
}

// ---------------------------------------------------------------------------
// Test: UnknownSensor maps to 404 with UNKNOWN_SENSOR code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_sensor_returns_404() {
    let (status, json) = error_to_response(CoreError::UnknownSensor("X9".into()).into()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "UNKNOWN_SENSOR");
    assert_eq!(json["error"], "Unknown sensor: X9");
}

// ---------------------------------------------------------------------------
// Test: reading and threshold problems map to 422
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_reading_and_threshold_return_422() {
    let (status, json) = error_to_response(
        CoreError::InvalidReading {
            sensor_id: "S1".into(),
            reason: "value is not finite".into(),
        }
        .into(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_READING");

    let (status, json) = error_to_response(
        CoreError::InvalidThreshold {
            sensor_id: "S1".into(),
            max: 30.0,
            critical: 5.0,
        }
        .into(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_THRESHOLD");
}

// ---------------------------------------------------------------------------
// Test: Validation and BadRequest map to 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_and_bad_request_return_400() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Validation("userId is empty".into()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "userId is empty");

    let (status, json) = error_to_response(AppError::BadRequest("days out of range".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Conflict maps to 409 with CONFLICT code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("slot occupied".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Test: BrokerError::UnknownSession maps to 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_session_returns_404() {
    let err = AppError::Broker(BrokerError::UnknownSession("abc".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "UNKNOWN_SESSION");
}

// ---------------------------------------------------------------------------
// Test: internal errors are sanitized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_errors_hide_details() {
    for err in [
        AppError::InternalError("registry file handle leaked".into()),
        AppError::Core(CoreError::Internal("mutex poisoned".into())),
    ] {
        let (status, json) = error_to_response(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}
