//! Server configuration.
//!
//! Consolidates environment variable reads and CLI overrides into one
//! validated struct.

use std::net::SocketAddr;

use openpoker::db::DatabaseConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    Invalid { var: String, value: String },
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Socket bind address.
    pub bind: SocketAddr,
    /// Database configuration; `None` runs memory-only with history
    /// dropped.
    pub database: Option<DatabaseConfig>,
    /// Prometheus exporter bind address, if enabled.
    pub metrics_bind: Option<SocketAddr>,
    /// Commands per second allowed per socket.
    pub commands_per_second: usize,
}

impl ServerConfig {
    /// Load from environment variables, with CLI overrides taking
    /// precedence.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => {
                let raw =
                    std::env::var("SERVER_BIND").unwrap_or_else(|_| "127.0.0.1:7070".to_string());
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    value: raw,
                })?
            }
        };

        let database_url = database_url_override.or_else(|| std::env::var("DATABASE_URL").ok());
        let database = database_url.map(|database_url| DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 50),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
        });

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                value: raw,
            })?),
            Err(_) => None,
        };

        Ok(Self {
            bind,
            database,
            metrics_bind,
            commands_per_second: parse_env_or(
                "COMMANDS_PER_SECOND",
                openpoker::constants::DEFAULT_COMMANDS_PER_SECOND,
            ),
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let bind: SocketAddr = "0.0.0.0:9999".parse().unwrap();
        let config = ServerConfig::from_env(Some(bind), Some("postgres://x/y".to_string())).unwrap();
        assert_eq!(config.bind, bind);
        assert_eq!(
            config.database.as_ref().map(|d| d.database_url.as_str()),
            Some("postgres://x/y")
        );
    }

    #[test]
    fn missing_database_is_memory_only() {
        // Only valid when DATABASE_URL is not exported into the test env.
        if std::env::var("DATABASE_URL").is_err() {
            let config = ServerConfig::from_env(None, None).unwrap();
            assert!(config.database.is_none());
        }
    }
}
