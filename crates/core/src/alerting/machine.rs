//! Alert lifecycle tracking per (sensor, condition).
//!
//! Each slot moves `Idle → Active → Acknowledged → Resolved → Idle`. Slots
//! live in a sharded concurrent map so unrelated sensors never contend; an
//! operation only ever holds one slot guard at a time.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::TimeDelta;
use dashmap::DashMap;

use crate::alert::{Alert, AlertAction, AlertCondition, AlertSeverity, AlertStatus, AlertTransition};
use crate::alerting::policy::{HysteresisPolicy, SeverityPolicy};
use crate::alerting::stats::{self, AlertStats};
use crate::error::CoreError;
use crate::sensor::{Sensor, Status};
use crate::types::{AlertId, SensorId, SiteId, Timestamp, UserId};

/// Number of resolved alerts kept in memory when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    sensor_id: SensorId,
    condition: AlertCondition,
}

impl SlotKey {
    fn new(sensor_id: &str, condition: AlertCondition) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            condition,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// The single non-resolved alert for this key, if any.
    open: Option<Alert>,
    normal_streak: u32,
    normal_since: Option<Timestamp>,
}

impl Slot {
    fn reset_streak(&mut self) {
        self.normal_streak = 0;
        self.normal_since = None;
    }
}

/// Filter for [`AlertStateMachine::active`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub site_id: Option<SiteId>,
    pub sensor_id: Option<SensorId>,
    pub severity: Option<AlertSeverity>,
}

impl AlertFilter {
    fn matches(&self, alert: &Alert) -> bool {
        self.site_id.as_ref().is_none_or(|s| *s == alert.site_id)
            && self.sensor_id.as_ref().is_none_or(|s| *s == alert.sensor_id)
            && self.severity.is_none_or(|s| s == alert.severity)
    }
}

/// Owns every alert's lifecycle. Nothing else mutates an [`Alert`].
pub struct AlertStateMachine {
    slots: DashMap<SlotKey, Slot>,
    /// Open alert id → slot, for operator actions.
    index: DashMap<AlertId, SlotKey>,
    /// Resolved alerts, oldest first.
    history: Mutex<VecDeque<Alert>>,
    history_limit: usize,
    severity: SeverityPolicy,
    confirmations: u32,
    min_normal_duration: TimeDelta,
}

impl AlertStateMachine {
    pub fn new(severity: SeverityPolicy, hysteresis: HysteresisPolicy) -> Self {
        Self {
            slots: DashMap::new(),
            index: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            severity,
            confirmations: hysteresis.confirmations.max(1),
            min_normal_duration: TimeDelta::from_std(hysteresis.min_duration)
                .unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Feed a status observation for a sensor and return the resulting
    /// lifecycle transitions (possibly none).
    ///
    /// Breaches are edge-triggered: an open alert is updated, never
    /// duplicated. `normal` counts toward the hysteresis window of an open
    /// threshold alert. `offline` opens a separate offline alert which any
    /// later non-offline status resolves.
    pub fn observe(
        &self,
        sensor: &Sensor,
        status: Status,
        value: f64,
        at: Timestamp,
    ) -> Result<Vec<AlertTransition>, CoreError> {
        let mut out = Vec::new();
        match status {
            Status::Warning | Status::Critical => {
                self.resolve_offline(sensor, at, &mut out);
                self.on_breach(sensor, status, value, at, &mut out)?;
            }
            Status::Normal => {
                self.resolve_offline(sensor, at, &mut out);
                self.on_normal(sensor, at, &mut out);
            }
            Status::Offline => self.on_offline(sensor, at, &mut out)?,
        }
        Ok(out)
    }

    /// Whether the sensor currently has a non-resolved alert for `condition`.
    pub fn is_open(&self, sensor_id: &str, condition: AlertCondition) -> bool {
        self.slots
            .get(&SlotKey::new(sensor_id, condition))
            .is_some_and(|slot| slot.open.is_some())
    }

    /// Operator acknowledgment: `Active → Acknowledged`.
    pub fn acknowledge(&self, alert_id: AlertId, user_id: &str, at: Timestamp) -> Result<Alert, CoreError> {
        const ACTION: &str = "acknowledge";
        let key = self.locate(alert_id, ACTION)?;
        let mut slot = self
            .slots
            .get_mut(&key)
            .ok_or_else(|| self.not_open(alert_id, ACTION))?;

        let alert = match slot.open.as_mut() {
            Some(alert) if alert.id == alert_id => alert,
            _ => return Err(self.not_open(alert_id, ACTION)),
        };
        if alert.status != AlertStatus::Active {
            return Err(CoreError::InvalidTransition {
                alert_id,
                action: ACTION,
                reason: format!("alert is already {}", alert.status.as_str()),
            });
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(user_id.to_string());
        alert.acknowledged_at = Some(at);
        alert.updated_at = at;
        Ok(alert.clone())
    }

    /// Operator resolution from `Active` or `Acknowledged`, bypassing hysteresis.
    pub fn resolve(&self, alert_id: AlertId, user_id: &str, at: Timestamp) -> Result<Alert, CoreError> {
        const ACTION: &str = "resolve";
        let key = self.locate(alert_id, ACTION)?;
        let mut slot = self
            .slots
            .get_mut(&key)
            .ok_or_else(|| self.not_open(alert_id, ACTION))?;

        if !slot.open.as_ref().is_some_and(|a| a.id == alert_id) {
            return Err(self.not_open(alert_id, ACTION));
        }
        self.close(&mut slot, at, Some(user_id.to_string()))
            .ok_or_else(|| self.not_open(alert_id, ACTION))
    }

    /// Look up an alert by id, open or resolved.
    pub fn get(&self, alert_id: AlertId) -> Option<Alert> {
        let key = self.index.get(&alert_id).map(|k| k.clone());
        if let Some(key) = key {
            let open = self
                .slots
                .get(&key)
                .and_then(|slot| slot.open.clone())
                .filter(|a| a.id == alert_id);
            if open.is_some() {
                return open;
            }
        }
        self.history_lock().iter().find(|a| a.id == alert_id).cloned()
    }

    /// Non-resolved alerts matching `filter`, most severe first, then newest first.
    pub fn active(&self, filter: &AlertFilter) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .slots
            .iter()
            .filter_map(|slot| slot.open.clone())
            .filter(|a| filter.matches(a))
            .collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        alerts
    }

    pub fn open_count(&self) -> usize {
        self.index.len()
    }

    /// Most recently resolved alerts, newest first.
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        self.history_lock().iter().rev().take(limit).cloned().collect()
    }

    /// Statistics over open and retained resolved alerts created since `since`.
    pub fn stats(&self, since: Timestamp) -> AlertStats {
        let mut alerts: Vec<Alert> = self
            .slots
            .iter()
            .filter_map(|slot| slot.open.clone())
            .collect();
        alerts.extend(self.history_lock().iter().cloned());
        stats::compute(alerts.iter(), since)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn on_breach(
        &self,
        sensor: &Sensor,
        status: Status,
        value: f64,
        at: Timestamp,
        out: &mut Vec<AlertTransition>,
    ) -> Result<(), CoreError> {
        let Some(severity) = self.severity.severity_for(sensor.sensor_type, status) else {
            return Ok(());
        };
        let (title, message) = describe_breach(sensor, status, value);

        let key = SlotKey::new(&sensor.id, AlertCondition::Threshold);
        let mut slot = self.slots.entry(key.clone()).or_default();
        slot.reset_streak();

        if let Some(alert) = slot.open.as_mut() {
            if severity >= alert.severity {
                alert.severity = severity;
                alert.title = title;
                alert.message = message;
                alert.updated_at = at;
                out.push(AlertTransition::new(AlertAction::Updated, alert.clone()));
            }
            return Ok(());
        }

        let alert = new_alert(sensor, AlertCondition::Threshold, severity, title, message, at);
        self.open(&key, &mut slot, alert.clone())?;
        out.push(AlertTransition::new(AlertAction::Created, alert));
        Ok(())
    }

    fn on_normal(&self, sensor: &Sensor, at: Timestamp, out: &mut Vec<AlertTransition>) {
        let key = SlotKey::new(&sensor.id, AlertCondition::Threshold);
        let Some(mut slot) = self.slots.get_mut(&key) else {
            return;
        };
        if slot.open.is_none() {
            slot.reset_streak();
            return;
        }

        slot.normal_streak += 1;
        let since = *slot.normal_since.get_or_insert(at);
        let confirmed = slot.normal_streak >= self.confirmations
            && at.signed_duration_since(since) >= self.min_normal_duration;
        if confirmed {
            if let Some(alert) = self.close(&mut slot, at, None) {
                out.push(AlertTransition::new(AlertAction::Resolved, alert));
            }
        }
    }

    fn on_offline(&self, sensor: &Sensor, at: Timestamp, out: &mut Vec<AlertTransition>) -> Result<(), CoreError> {
        // Silence is not evidence of recovery.
        if let Some(mut slot) = self.slots.get_mut(&SlotKey::new(&sensor.id, AlertCondition::Threshold)) {
            slot.reset_streak();
        }

        let key = SlotKey::new(&sensor.id, AlertCondition::Offline);
        let mut slot = self.slots.entry(key.clone()).or_default();
        if slot.open.is_some() {
            return Ok(());
        }
        let alert = new_alert(
            sensor,
            AlertCondition::Offline,
            self.severity.offline_severity(),
            format!("Sensor {} offline", sensor.id),
            format!(
                "No readings from {} sensor {} at site {} within the liveness window",
                sensor.sensor_type.as_str(),
                sensor.id,
                sensor.site_id
            ),
            at,
        );
        self.open(&key, &mut slot, alert.clone())?;
        out.push(AlertTransition::new(AlertAction::Created, alert));
        Ok(())
    }

    fn resolve_offline(&self, sensor: &Sensor, at: Timestamp, out: &mut Vec<AlertTransition>) {
        let key = SlotKey::new(&sensor.id, AlertCondition::Offline);
        let Some(mut slot) = self.slots.get_mut(&key) else {
            return;
        };
        if let Some(alert) = self.close(&mut slot, at, None) {
            out.push(AlertTransition::new(AlertAction::Resolved, alert));
        }
    }

    // -----------------------------------------------------------------------
    // Slot bookkeeping
    // -----------------------------------------------------------------------

    /// Install a new open alert. An occupied slot is a conflict: callers
    /// must take the update path for an existing alert instead.
    fn open(&self, key: &SlotKey, slot: &mut Slot, alert: Alert) -> Result<(), CoreError> {
        if let Some(existing) = &slot.open {
            return Err(CoreError::Conflict(format!(
                "sensor {} already has open alert {} for this condition",
                key.sensor_id, existing.id
            )));
        }
        self.index.insert(alert.id, key.clone());
        slot.open = Some(alert);
        slot.reset_streak();
        Ok(())
    }

    /// Resolve and retire the slot's open alert, if any.
    fn close(&self, slot: &mut Slot, at: Timestamp, by: Option<UserId>) -> Option<Alert> {
        let mut alert = slot.open.take()?;
        slot.reset_streak();

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(at);
        alert.resolved_by = by;
        alert.updated_at = at;

        self.index.remove(&alert.id);
        let mut history = self.history_lock();
        history.push_back(alert.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }
        Some(alert)
    }

    fn locate(&self, alert_id: AlertId, action: &'static str) -> Result<SlotKey, CoreError> {
        self.index
            .get(&alert_id)
            .map(|k| k.clone())
            .ok_or_else(|| self.not_open(alert_id, action))
    }

    fn not_open(&self, alert_id: AlertId, action: &'static str) -> CoreError {
        let resolved = self.history_lock().iter().any(|a| a.id == alert_id);
        CoreError::InvalidTransition {
            alert_id,
            action,
            reason: if resolved {
                "alert is already resolved".to_string()
            } else {
                "alert does not exist".to_string()
            },
        }
    }

    fn history_lock(&self) -> MutexGuard<'_, VecDeque<Alert>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new(SeverityPolicy::default(), HysteresisPolicy::default())
    }
}

fn new_alert(
    sensor: &Sensor,
    condition: AlertCondition,
    severity: AlertSeverity,
    title: String,
    message: String,
    at: Timestamp,
) -> Alert {
    Alert {
        id: uuid::Uuid::now_v7(),
        sensor_id: sensor.id.clone(),
        site_id: sensor.site_id.clone(),
        condition,
        severity,
        title,
        message,
        status: AlertStatus::Active,
        created_at: at,
        updated_at: at,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
    }
}

fn describe_breach(sensor: &Sensor, status: Status, value: f64) -> (String, String) {
    let kind = sensor.sensor_type.as_str();
    if status == Status::Critical {
        (
            format!("Critical {kind} reading at site {}", sensor.site_id),
            format!(
                "Sensor {} reported {value} {}, at or above the critical threshold of {}",
                sensor.id, sensor.unit, sensor.threshold.critical
            ),
        )
    } else {
        (
            format!("Elevated {kind} reading at site {}", sensor.site_id),
            format!(
                "Sensor {} reported {value} {}, at or above the warning threshold of {}",
                sensor.id, sensor.unit, sensor.threshold.max
            ),
        )
    }
}
