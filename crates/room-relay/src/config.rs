//! Room Relay configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. The relay deliberately has a small surface: one listening
//! port, an instance identifier, and the heartbeat timings.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default heartbeat ping interval in seconds (0 disables reaping).
pub const DEFAULT_PING_INTERVAL_SECONDS: u64 = 30;

/// Default cutoff after which a silent connection is considered dead.
pub const DEFAULT_PONG_TIMEOUT_SECONDS: u64 = 75;

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Room Relay configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listening port for the gateway (default: 8080).
    pub port: u16,

    /// Unique identifier for this relay instance.
    pub relay_id: String,

    /// Heartbeat ping interval in seconds (default: 30, 0 disables).
    pub ping_interval_seconds: u64,

    /// Seconds without a pong before a connection is reaped (default: 75).
    pub pong_timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = match vars.get("RELAY_PORT") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue("RELAY_PORT".to_string(), raw.clone())
            })?,
            None => DEFAULT_PORT,
        };

        let ping_interval_seconds = match vars.get("RELAY_PING_INTERVAL_SECONDS") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue("RELAY_PING_INTERVAL_SECONDS".to_string(), raw.clone())
            })?,
            None => DEFAULT_PING_INTERVAL_SECONDS,
        };

        let pong_timeout_seconds = match vars.get("RELAY_PONG_TIMEOUT_SECONDS") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue("RELAY_PONG_TIMEOUT_SECONDS".to_string(), raw.clone())
            })?,
            None => DEFAULT_PONG_TIMEOUT_SECONDS,
        };

        // Generate relay instance ID
        let relay_id = vars.get("RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            port,
            relay_id,
            ping_interval_seconds,
            pong_timeout_seconds,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.ping_interval_seconds, DEFAULT_PING_INTERVAL_SECONDS);
        assert_eq!(config.pong_timeout_seconds, DEFAULT_PONG_TIMEOUT_SECONDS);
        // Relay ID should be auto-generated
        assert!(config.relay_id.starts_with("relay-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("RELAY_PORT".to_string(), "9091".to_string()),
            ("RELAY_PING_INTERVAL_SECONDS".to_string(), "10".to_string()),
            ("RELAY_PONG_TIMEOUT_SECONDS".to_string(), "25".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");

        assert_eq!(config.port, 9091);
        assert_eq!(config.ping_interval_seconds, 10);
        assert_eq!(config.pong_timeout_seconds, 25);
    }

    #[test]
    fn test_relay_id_custom_value() {
        let vars = HashMap::from([("RELAY_ID".to_string(), "relay-custom-001".to_string())]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.relay_id, "relay-custom-001");
    }

    #[test]
    fn test_from_vars_invalid_port() {
        let vars = HashMap::from([("RELAY_PORT".to_string(), "not-a-port".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(v, _)) if v == "RELAY_PORT"));
    }

    #[test]
    fn test_from_vars_heartbeat_disabled() {
        let vars = HashMap::from([("RELAY_PING_INTERVAL_SECONDS".to_string(), "0".to_string())]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(config.ping_interval_seconds, 0);
    }
}
