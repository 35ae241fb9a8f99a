use std::str::FromStr;
use std::time::Duration;

use geowatch_core::alerting::{HysteresisPolicy, DEFAULT_HISTORY_LIMIT};
use geowatch_events::BrokerConfig;
use geowatch_pipeline::IngestConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background tasks to stop after the server drains.
    pub shutdown_timeout_secs: u64,
    /// JSON file with provisioned sensors. Unset means an empty registry.
    pub sensor_registry_path: Option<String>,
    pub registry_cache_ttl_secs: u64,
    pub liveness_window_secs: u64,
    pub liveness_sweep_interval_secs: u64,
    pub hysteresis_confirmations: u32,
    pub hysteresis_min_secs: u64,
    pub alert_history_limit: usize,
    pub session_queue_capacity: usize,
    pub session_priority_capacity: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_max_missed: u32,
    pub session_resume_grace_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `3000`                  |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`        | `30`                    |
    /// | `SENSOR_REGISTRY_PATH`         | unset                   |
    /// | `REGISTRY_CACHE_TTL_SECS`      | `300`                   |
    /// | `LIVENESS_WINDOW_SECS`         | `60`                    |
    /// | `LIVENESS_SWEEP_INTERVAL_SECS` | liveness window / 2     |
    /// | `HYSTERESIS_CONFIRMATIONS`     | `3`                     |
    /// | `HYSTERESIS_MIN_SECS`          | `0`                     |
    /// | `ALERT_HISTORY_LIMIT`          | `1000`                  |
    /// | `SESSION_QUEUE_CAPACITY`       | `256`                   |
    /// | `SESSION_PRIORITY_CAPACITY`    | `64`                    |
    /// | `HEARTBEAT_INTERVAL_SECS`      | `30`                    |
    /// | `HEARTBEAT_MAX_MISSED`         | `3`                     |
    /// | `SESSION_RESUME_GRACE_SECS`    | `120`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sensor_registry_path = std::env::var("SENSOR_REGISTRY_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty());

        let liveness_window_secs: u64 = env_or("LIVENESS_WINDOW_SECS", 60);
        let liveness_sweep_interval_secs =
            env_nonzero("LIVENESS_SWEEP_INTERVAL_SECS", (liveness_window_secs / 2).max(1));

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            sensor_registry_path,
            registry_cache_ttl_secs: env_or("REGISTRY_CACHE_TTL_SECS", 300),
            liveness_window_secs,
            liveness_sweep_interval_secs,
            hysteresis_confirmations: env_or("HYSTERESIS_CONFIRMATIONS", 3),
            hysteresis_min_secs: env_or("HYSTERESIS_MIN_SECS", 0),
            alert_history_limit: env_or("ALERT_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT),
            session_queue_capacity: env_or("SESSION_QUEUE_CAPACITY", 256),
            session_priority_capacity: env_or("SESSION_PRIORITY_CAPACITY", 64),
            heartbeat_interval_secs: env_nonzero("HEARTBEAT_INTERVAL_SECS", 30),
            heartbeat_max_missed: env_or("HEARTBEAT_MAX_MISSED", 3),
            session_resume_grace_secs: env_or("SESSION_RESUME_GRACE_SECS", 120),
        }
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            live_capacity: self.session_queue_capacity,
            priority_capacity: self.session_priority_capacity,
            max_missed_pings: self.heartbeat_max_missed,
            resume_grace: Duration::from_secs(self.session_resume_grace_secs),
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            liveness_window: Duration::from_secs(self.liveness_window_secs),
        }
    }

    /// Panics on zero confirmations: misconfiguration should fail at startup.
    pub fn hysteresis(&self) -> HysteresisPolicy {
        HysteresisPolicy::new(
            self.hysteresis_confirmations,
            Duration::from_secs(self.hysteresis_min_secs),
        )
        .expect("HYSTERESIS_CONFIRMATIONS must be at least 1")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            sensor_registry_path: None,
            registry_cache_ttl_secs: 300,
            liveness_window_secs: 60,
            liveness_sweep_interval_secs: 30,
            hysteresis_confirmations: 3,
            hysteresis_min_secs: 0,
            alert_history_limit: DEFAULT_HISTORY_LIMIT,
            session_queue_capacity: 256,
            session_priority_capacity: 64,
            heartbeat_interval_secs: 30,
            heartbeat_max_missed: 3,
            session_resume_grace_secs: 120,
        }
    }
}

/// Parse an env var, falling back to `default` when unset. Panics on a value
/// that does not parse.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

/// Like [`env_or`] for timer periods. Panics on zero, which the background
/// timers cannot run with.
fn env_nonzero(name: &str, default: u64) -> u64 {
    let value = env_or(name, default);
    assert!(value > 0, "{name} must be greater than zero");
    value
}
