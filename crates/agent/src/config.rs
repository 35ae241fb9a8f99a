use std::time::Duration;

use geowatch_events::ClientMessage;

use crate::reconnect::BackoffPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server WebSocket endpoint, e.g. `ws://host:3000/api/v1/ws`.
    pub ws_url: String,
    /// Sites to watch live data for. Empty means every site.
    pub sites: Vec<String>,
    pub backoff: BackoffPolicy,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                  | Required | Default | Description                        |
    /// |---------------------------|----------|---------|------------------------------------|
    /// | `GEOWATCH_WS_URL`         | yes      | --      | WebSocket endpoint                 |
    /// | `SUBSCRIBE_SITES`         | no       | all     | Comma-separated site ids           |
    /// | `RECONNECT_BASE_DELAY_MS` | no       | `1000`  | Delay before the first reconnect   |
    /// | `RECONNECT_MULTIPLIER`    | no       | `2`     | Delay growth per failed attempt    |
    /// | `RECONNECT_MAX_ATTEMPTS`  | no       | `5`     | Failed attempts before giving up   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_url =
            std::env::var("GEOWATCH_WS_URL").map_err(|_| ConfigError::Missing("GEOWATCH_WS_URL"))?;

        let sites = std::env::var("SUBSCRIBE_SITES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = BackoffPolicy::default();
        let base_delay_ms: u64 = parse_env(
            "RECONNECT_BASE_DELAY_MS",
            defaults.base_delay.as_millis() as u64,
        )?;
        let multiplier: f64 = parse_env("RECONNECT_MULTIPLIER", defaults.multiplier)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                name: "RECONNECT_MULTIPLIER",
                reason: format!("must be at least 1, got {multiplier}"),
            });
        }
        let max_attempts: u32 = parse_env("RECONNECT_MAX_ATTEMPTS", defaults.max_attempts)?;

        Ok(Self {
            ws_url,
            sites,
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(base_delay_ms),
                multiplier,
                max_attempts,
            },
        })
    }

    /// Subscriptions this agent keeps alive across reconnects: alerts plus
    /// live data and predictions for each configured site.
    pub fn subscriptions(&self) -> Vec<ClientMessage> {
        let mut subs = vec![ClientMessage::SubscribeAlerts];
        if self.sites.is_empty() {
            subs.push(ClientMessage::SubscribeLiveData { site_id: None });
            subs.push(ClientMessage::SubscribePredictions { site_id: None });
        }
        for site in &self.sites {
            subs.push(ClientMessage::SubscribeLiveData {
                site_id: Some(site.clone()),
            });
            subs.push(ClientMessage::SubscribePredictions {
                site_id: Some(site.clone()),
            });
        }
        subs
    }
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
