//! Database configuration for PostgreSQL connection.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

/// Database configuration loaded from environment variables.
///
/// Environment variables are prefixed with `POSTGRES_`:
/// - `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`
/// - `POSTGRES_DATABASE`: Database name (default: "weft")
/// - `POSTGRES_SCHEMA`: Schema holding the engine tables (default: "weft")
/// - `POSTGRES_MAX_CONNECTIONS` / `POSTGRES_MIN_CONNECTIONS`: Pool bounds
/// - `POSTGRES_ACQUIRE_TIMEOUT_SECS`, `POSTGRES_IDLE_TIMEOUT_SECS`
/// - `POSTGRES_STATEMENT_TIMEOUT_MS`: Server-side cap per statement (0 disables)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_name")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_name")]
    pub database: String,

    /// Schema the engine tables live in, used as the connection `search_path`
    #[serde(default = "default_name")]
    pub schema: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Pause transitions lock rows; a stuck statement must not hold them forever.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,

    /// Reported in `pg_stat_activity`
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "weft".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_statement_timeout() -> u64 {
    30_000
}

fn default_application_name() -> String {
    "weft-engine".to_string()
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("POSTGRES_").from_env::<DatabaseConfig>()
    }

    /// Connection options: credentials, `search_path` and the statement timeout.
    pub fn connect_options(&self) -> PgConnectOptions {
        let statement_timeout = self.statement_timeout_ms.to_string();

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .application_name(&self.application_name)
            .options([
                ("search_path", self.schema.as_str()),
                ("statement_timeout", statement_timeout.as_str()),
            ])
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// `None` keeps idle connections open indefinitely.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Connection target without credentials, for logs.
    pub fn display_url(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}?schema={}",
            self.user, self.host, self.port, self.database, self.schema
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_name(),
            password: String::new(),
            database: default_name(),
            schema: default_name(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            statement_timeout_ms: default_statement_timeout(),
            application_name: default_application_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "weft");
        assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_display_url_hides_password() {
        let config = DatabaseConfig {
            password: "secret".to_string(),
            schema: "tenant_a".to_string(),
            ..DatabaseConfig::default()
        };
        let url = config.display_url();
        assert_eq!(url, "postgres://weft@localhost:5432/weft?schema=tenant_a");
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_zero_idle_timeout_disables_it() {
        let config = DatabaseConfig {
            idle_timeout_secs: 0,
            ..DatabaseConfig::default()
        };
        assert_eq!(config.idle_timeout(), None);
    }
}
