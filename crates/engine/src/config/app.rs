//! Engine configuration.

use serde::Deserialize;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `WEFT_`:
/// - `WEFT_HOST`: Server bind address (default: "0.0.0.0")
/// - `WEFT_PORT`: Server port (default: 8090)
/// - `WEFT_SWEEP_INTERVAL_SECS`: Timeout monitor interval (default: 300)
/// - `WEFT_WARNING_WINDOW_MINUTES`: Warn this long before a pause expires (default: 15)
/// - `WEFT_DEFAULT_TIMEOUT_HOURS`: Pause timeout when a step sets none (default: 24)
/// - `WEFT_NATS_URL`: NATS server for interaction notifications (optional)
/// - `WEFT_NOTIFY_SUBJECT`: NATS subject prefix (default: "weft.interactions")
/// - `WEFT_SERVER_NAME`: Server name for identification
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout monitor sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Warning window before a pause deadline, in minutes
    #[serde(default = "default_warning_window")]
    pub warning_window_minutes: i64,

    /// Pause timeout applied when a step does not set one
    #[serde(default = "default_timeout_hours")]
    pub default_timeout_hours: f64,

    /// NATS URL (optional)
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject interaction notifications are published under
    #[serde(default = "default_notify_subject")]
    pub notify_subject: String,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_warning_window() -> i64 {
    15
}

fn default_timeout_hours() -> f64 {
    24.0
}

fn default_notify_subject() -> String {
    "weft.interactions".to_string()
}

fn default_server_name() -> String {
    "weft-engine".to_string()
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `WEFT_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("WEFT_").from_env::<EngineConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn warning_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.warning_window_minutes.max(0))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sweep_interval_secs: default_sweep_interval(),
            warning_window_minutes: default_warning_window(),
            default_timeout_hours: default_timeout_hours(),
            nats_url: None,
            notify_subject: default_notify_subject(),
            server_name: default_server_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8090);
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.warning_window(), chrono::Duration::minutes(15));
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_bind_address() {
        let config = EngineConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8090");
    }
}
