//! Sensor provisioning lookup.
//!
//! The registry is owned outside the real-time core. [`SensorRegistry`] is
//! the seam; [`InMemoryRegistry`] backs it from a JSON provisioning file and
//! [`CachedRegistry`] adds a read-through TTL cache for the ingest path.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use geowatch_core::error::CoreError;
use geowatch_core::sensor::Sensor;
use geowatch_core::types::SensorId;

#[async_trait]
pub trait SensorRegistry: Send + Sync {
    /// `Ok(None)` when no sensor with this id is provisioned.
    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, CoreError>;

    async fn all_sensors(&self) -> Result<Vec<Sensor>, CoreError>;
}

// ---------------------------------------------------------------------------
// InMemoryRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRegistry {
    sensors: RwLock<HashMap<SensorId, Sensor>>,
}

impl InMemoryRegistry {
    pub fn new(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        let sensors = sensors.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            sensors: RwLock::new(sensors),
        }
    }

    /// Parse a JSON array of sensors. Records that fail validation are
    /// skipped with a warning so one bad entry cannot take a site down.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let parsed: Vec<Sensor> = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("sensor registry: {e}")))?;

        let mut valid = Vec::with_capacity(parsed.len());
        for sensor in parsed {
            match sensor.check() {
                Ok(()) => valid.push(sensor),
                Err(e) => tracing::warn!(sensor_id = %sensor.id, error = %e, "Skipping invalid sensor"),
            }
        }
        Ok(Self::new(valid))
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::Internal(format!("reading sensor registry {}: {e}", path.display()))
        })?;
        let registry = Self::from_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            count = registry.len().await,
            "Loaded sensor registry",
        );
        Ok(registry)
    }

    /// Insert or replace a provisioning record.
    pub async fn upsert(&self, sensor: Sensor) {
        self.sensors.write().await.insert(sensor.id.clone(), sensor);
    }

    pub async fn remove(&self, sensor_id: &str) -> Option<Sensor> {
        self.sensors.write().await.remove(sensor_id)
    }

    pub async fn len(&self) -> usize {
        self.sensors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SensorRegistry for InMemoryRegistry {
    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, CoreError> {
        Ok(self.sensors.read().await.get(sensor_id).cloned())
    }

    async fn all_sensors(&self) -> Result<Vec<Sensor>, CoreError> {
        let mut sensors: Vec<Sensor> = self.sensors.read().await.values().cloned().collect();
        sensors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sensors)
    }
}

// ---------------------------------------------------------------------------
// CachedRegistry
// ---------------------------------------------------------------------------

struct CacheEntry {
    sensor: Sensor,
    fetched_at: Instant,
}

/// Read-through cache over another registry.
///
/// Only hits are cached, so a newly provisioned sensor is visible on its
/// first reading. A corrected record takes effect once its entry expires.
pub struct CachedRegistry<R> {
    inner: R,
    ttl: Duration,
    entries: DashMap<SensorId, CacheEntry>,
}

impl<R: SensorRegistry> CachedRegistry<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn invalidate(&self, sensor_id: &str) {
        self.entries.remove(sensor_id);
    }

    fn fresh(&self, sensor_id: &str) -> Option<Sensor> {
        let entry = self.entries.get(sensor_id)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.sensor.clone())
    }
}

#[async_trait]
impl<R: SensorRegistry> SensorRegistry for CachedRegistry<R> {
    async fn get_sensor(&self, sensor_id: &str) -> Result<Option<Sensor>, CoreError> {
        if let Some(sensor) = self.fresh(sensor_id) {
            return Ok(Some(sensor));
        }

        let fetched = self.inner.get_sensor(sensor_id).await?;
        match &fetched {
            Some(sensor) => {
                self.entries.insert(
                    sensor_id.to_string(),
                    CacheEntry {
                        sensor: sensor.clone(),
                        fetched_at: Instant::now(),
                    },
                );
            }
            None => {
                self.entries.remove(sensor_id);
            }
        }
        Ok(fetched)
    }

    async fn all_sensors(&self) -> Result<Vec<Sensor>, CoreError> {
        self.inner.all_sensors().await
    }
}

#[cfg(test)]
mod tests {
    use geowatch_core::sensor::{SensorType, Threshold};

    use super::*;

    fn sensor(id: &str, max: f64) -> Sensor {
        Sensor {
            id: id.into(),
            sensor_type: SensorType::Strain,
            unit: "ue".into(),
            threshold: Threshold { max, critical: 20.0 },
            site_id: "site-a".into(),
            valid_range: None,
        }
    }

    #[test]
    fn json_loader_skips_invalid_records() {
        let json = r#"[
            {"id":"S1","type":"tilt","unit":"deg","threshold":{"max":5,"critical":10},"siteId":"a"},
            {"id":"S2","type":"tilt","unit":"deg","threshold":{"max":10,"critical":5},"siteId":"a"},
            {"id":"","type":"tilt","unit":"deg","threshold":{"max":1,"critical":2},"siteId":"a"}
        ]"#;
        let registry = InMemoryRegistry::from_json_str(json).expect("valid json");
        let ids: Vec<String> = registry.sensors.try_read().expect("uncontended").keys().cloned().collect();
        assert_eq!(ids, ["S1"]);
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            InMemoryRegistry::from_json_str("{not json"),
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn lookup_and_listing() {
        let registry = InMemoryRegistry::new([sensor("B", 1.0), sensor("A", 1.0)]);
        assert!(registry.get_sensor("A").await.unwrap().is_some());
        assert!(registry.get_sensor("Z").await.unwrap().is_none());
        let ids: Vec<String> = registry.all_sensors().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["A", "B"]);
    }

    #[tokio::test]
    async fn cache_serves_stale_record_until_ttl() {
        let cached = CachedRegistry::new(InMemoryRegistry::new([sensor("S1", 5.0)]), Duration::from_secs(300));
        assert_eq!(cached.get_sensor("S1").await.unwrap().unwrap().threshold.max, 5.0);

        cached.inner().upsert(sensor("S1", 8.0)).await;
        assert_eq!(cached.get_sensor("S1").await.unwrap().unwrap().threshold.max, 5.0);

        cached.invalidate("S1");
        assert_eq!(cached.get_sensor("S1").await.unwrap().unwrap().threshold.max, 8.0);
    }

    #[tokio::test]
    async fn zero_ttl_always_reads_through() {
        let cached = CachedRegistry::new(InMemoryRegistry::default(), Duration::ZERO);
        assert!(cached.get_sensor("S1").await.unwrap().is_none());

        cached.inner().upsert(sensor("S1", 5.0)).await;
        assert!(cached.get_sensor("S1").await.unwrap().is_some());
        cached.inner().remove("S1").await;
        assert!(cached.get_sensor("S1").await.unwrap().is_none());
    }
}
