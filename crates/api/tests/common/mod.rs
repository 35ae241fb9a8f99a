#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use geowatch_api::config::ServerConfig;
use geowatch_api::router::build_app_router;
use geowatch_api::state::AppState;
use geowatch_core::sensor::{Sensor, SensorType, Threshold, ValidRange};
use geowatch_pipeline::{InMemoryRegistry, SensorRegistry};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a single-reading hysteresis window so tests resolve quickly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        hysteresis_confirmations: 1,
        ..ServerConfig::default()
    }
}

/// Two tilt sensors on site `north` and one on site `south`.
pub fn test_sensors() -> Vec<Sensor> {
    ["N1", "N2", "S1"]
        .into_iter()
        .map(|id| Sensor {
            id: id.to_string(),
            sensor_type: SensorType::Tilt,
            unit: "mm".into(),
            threshold: Threshold {
                max: 10.0,
                critical: 20.0,
            },
            site_id: if id.starts_with('N') { "north" } else { "south" }.into(),
            valid_range: Some(ValidRange {
                min: -100.0,
                max: 100.0,
            }),
        })
        .collect()
}

/// Build the shared state over an in-memory registry of [`test_sensors`].
pub fn test_state() -> AppState {
    let registry: Arc<dyn SensorRegistry> = Arc::new(InMemoryRegistry::new(test_sensors()));
    AppState::new(test_config(), registry)
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack. The state is returned too so
/// tests can inspect the broker and alert machine directly.
pub fn build_test_app() -> (Router, AppState) {
    let state = test_state();
    let app = build_app_router(state.clone(), &test_config());
    (app, state)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, Method::PUT, uri, body).await
}

async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A reading payload in wire format, timestamped now.
pub fn reading(sensor_id: &str, value: f64) -> serde_json::Value {
    serde_json::json!({
        "sensorId": sensor_id,
        "value": value,
        "unit": "mm",
        "timestamp": chrono::Utc::now(),
        "qualityScore": 0.95,
    })
}
