//! Aggregate alert statistics over a reporting window.

use serde::Serialize;

use crate::alert::{Alert, AlertSeverity, AlertStatus};
use crate::types::Timestamp;

/// Count of alerts per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityBreakdown {
    fn record(&mut self, severity: AlertSeverity) {
        match severity {
            AlertSeverity::Critical => self.critical += 1,
            AlertSeverity::High => self.high += 1,
            AlertSeverity::Medium => self.medium += 1,
            AlertSeverity::Low => self.low += 1,
        }
    }
}

/// Alert statistics for alerts created at or after `since`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub since: Timestamp,
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub acknowledged_alerts: usize,
    pub resolved_alerts: usize,
    pub severity_breakdown: SeverityBreakdown,
    /// Mean minutes from creation to acknowledgment, over acknowledged alerts.
    pub average_response_time_minutes: f64,
    /// Percentage of alerts that were acknowledged.
    pub acknowledgment_rate: f64,
    /// Percentage of alerts that were resolved.
    pub resolution_rate: f64,
}

/// Compute statistics over `alerts`, ignoring any created before `since`.
pub fn compute<'a>(alerts: impl IntoIterator<Item = &'a Alert>, since: Timestamp) -> AlertStats {
    let mut total = 0usize;
    let mut active = 0usize;
    let mut acknowledged = 0usize;
    let mut resolved = 0usize;
    let mut breakdown = SeverityBreakdown::default();
    let mut response_minutes = Vec::new();

    for alert in alerts.into_iter().filter(|a| a.created_at >= since) {
        total += 1;
        breakdown.record(alert.severity);
        if alert.status == AlertStatus::Active {
            active += 1;
        }
        if let Some(at) = alert.acknowledged_at {
            acknowledged += 1;
            let secs = at.signed_duration_since(alert.created_at).num_seconds();
            response_minutes.push(secs as f64 / 60.0);
        }
        if alert.resolved_at.is_some() {
            resolved += 1;
        }
    }

    let average = if response_minutes.is_empty() {
        0.0
    } else {
        response_minutes.iter().sum::<f64>() / response_minutes.len() as f64
    };

    AlertStats {
        since,
        total_alerts: total,
        active_alerts: active,
        acknowledged_alerts: acknowledged,
        resolved_alerts: resolved,
        severity_breakdown: breakdown,
        average_response_time_minutes: round2(average),
        acknowledgment_rate: percentage(acknowledged, total),
        resolution_rate: percentage(resolved, total),
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
