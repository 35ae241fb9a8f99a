//! Handlers for the `/alerts` resource.
//!
//! Acknowledge and resolve publish the resulting transition to every
//! `alerts` subscriber before responding.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{TimeDelta, Utc};
use geowatch_core::alert::{Alert, AlertAction, AlertSeverity, AlertTransition};
use geowatch_core::alerting::{AlertFilter, AlertStats};
use geowatch_core::error::CoreError;
use geowatch_core::types::{AlertId, SensorId, SiteId};
use geowatch_pipeline::dispatch;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query / request types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /alerts`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlertsQuery {
    pub site_id: Option<SiteId>,
    pub sensor_id: Option<SensorId>,
    pub severity: Option<AlertSeverity>,
}

/// Query parameters for `GET /alerts/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Defaults to 50, capped at 500.
    pub limit: Option<usize>,
}

/// Query parameters for `GET /alerts/stats`.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Reporting window in days. Defaults to 7.
    pub days: Option<i64>,
}

/// Body of acknowledge and resolve requests.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OperatorAction {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

const DEFAULT_STATS_DAYS: i64 = 7;
const MAX_STATS_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/alerts
///
/// Unresolved alerts, critical first, newest first within a severity.
pub async fn list_active(
    State(state): State<AppState>,
    Query(params): Query<ActiveAlertsQuery>,
) -> Json<DataResponse<Vec<Alert>>> {
    let filter = AlertFilter {
        site_id: params.site_id,
        sensor_id: params.sensor_id,
        severity: params.severity,
    };
    Json(DataResponse {
        data: state.alerts.active(&filter),
    })
}

/// GET /api/v1/alerts/history
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<DataResponse<Vec<Alert>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    Json(DataResponse {
        data: state.alerts.history(limit),
    })
}

/// GET /api/v1/alerts/stats?days=
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> AppResult<Json<DataResponse<AlertStats>>> {
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    if !(1..=MAX_STATS_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {MAX_STATS_DAYS}"
        )));
    }

    let since = Utc::now() - TimeDelta::days(days);
    Ok(Json(DataResponse {
        data: state.alerts.stats(since),
    }))
}

/// GET /api/v1/alerts/{id}
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<AlertId>,
) -> AppResult<Json<DataResponse<Alert>>> {
    let alert = state.alerts.get(alert_id).ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Alert",
            id: alert_id.to_string(),
        })
    })?;
    Ok(Json(DataResponse { data: alert }))
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

/// PUT /api/v1/alerts/{id}/acknowledge
///
/// Returns 409 `INVALID_TRANSITION` for unknown, acknowledged or resolved
/// alerts.
pub async fn acknowledge(
    State(state): State<AppState>,
    Path(alert_id): Path<AlertId>,
    Json(body): Json<OperatorAction>,
) -> AppResult<Json<DataResponse<Alert>>> {
    validate_body(&body)?;

    let alert = state.alerts.acknowledge(alert_id, &body.user_id, Utc::now())?;
    tracing::info!(alert_id = %alert_id, user_id = %body.user_id, "Alert acknowledged");

    announce(&state, AlertAction::Acknowledged, &alert).await;
    Ok(Json(DataResponse { data: alert }))
}

/// PUT /api/v1/alerts/{id}/resolve
///
/// Manual resolution ends the cycle; the next breach opens a new alert.
pub async fn resolve(
    State(state): State<AppState>,
    Path(alert_id): Path<AlertId>,
    Json(body): Json<OperatorAction>,
) -> AppResult<Json<DataResponse<Alert>>> {
    validate_body(&body)?;

    let alert = state.alerts.resolve(alert_id, &body.user_id, Utc::now())?;
    tracing::info!(alert_id = %alert_id, user_id = %body.user_id, "Alert resolved");

    announce(&state, AlertAction::Resolved, &alert).await;
    Ok(Json(DataResponse { data: alert }))
}

fn validate_body(body: &OperatorAction) -> AppResult<()> {
    body.validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))
}

async fn announce(state: &AppState, action: AlertAction, alert: &Alert) {
    dispatch::publish_alert(&state.broker, AlertTransition::new(action, alert.clone())).await;
}
