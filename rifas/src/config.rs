//! Configuration management for the raffle server.
//!
//! Loads configuration from environment variables (and `.env`, via `dotenvy`)
//! with defaults for everything except secrets.

use rifas_core::types::ReservationTtl;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: '{value}'")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,
    /// Ticket store backend
    pub storage: StorageConfig,
    /// Reservation defaults and the expiry reaper
    pub reservations: ReservationConfig,
    /// Remote API access for the demo
    pub client: ClientConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter directive (trace, debug, info, warn, error, or a full `EnvFilter`)
    pub log_level: Option<String>,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_timeout: Duration,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// `PostgreSQL` URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Reservation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationConfig {
    /// Hold length used by the demo grids
    pub ttl: ReservationTtl,
    /// Period of the expiry sweep; `None` disables it
    pub reaper_interval: Option<Duration>,
}

/// API client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of a remote server
    pub base_url: Option<String>,
    /// Bearer token sent to the remote server
    pub token: Option<String>,
}

impl ServerConfig {
    /// `host:port` for the listener
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any variable that is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for any variable that is set but unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ttl_minutes: i64 = parse(&lookup, "RESERVATION_TTL_MINUTES", i64::from(ReservationTtl::DEFAULT_MINUTES))?;
        let reaper_secs: u64 = parse(&lookup, "REAPER_INTERVAL_SECS", 0)?;

        Ok(Self {
            server: ServerConfig {
                host: text("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse(&lookup, "PORT", 8000)?,
                log_level: text("RUST_LOG"),
                shutdown_timeout: Duration::from_secs(parse(&lookup, "SHUTDOWN_TIMEOUT", 30)?),
            },
            storage: StorageConfig {
                database_url: text("DATABASE_URL"),
                max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            reservations: ReservationConfig {
                ttl: ReservationTtl::from_minutes(ttl_minutes),
                reaper_interval: (reaper_secs > 0).then(|| Duration::from_secs(reaper_secs)),
            },
            client: ClientConfig {
                base_url: text("RIFAS_API_BASE_URL"),
                token: text("RIFAS_API_TOKEN"),
            },
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
