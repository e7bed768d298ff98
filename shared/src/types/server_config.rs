use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Free-form environment name (development|staging|production).
    pub env: String,
    /// How long in-flight connections may keep running after a shutdown
    /// signal before the process exits anyway.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection string, e.g. `sqlite://movies.db` or `sqlite::memory:`.
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_time_secs: u64,
    /// Deadline applied to every individual storage operation.
    pub query_timeout_secs: u64,
}

/// Where the rate limiter takes its per-client key from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// The TCP peer address of the connection.
    Peer,
    /// The first `X-Forwarded-For` entry (or `X-Real-IP`), falling back to
    /// the peer address. Only safe behind a trusted proxy.
    Forwarded,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Refill rate, tokens per second.
    pub rps: f64,
    /// Bucket size.
    pub burst: u32,
    pub sweep_interval_secs: u64,
    /// Clients not seen for longer than this are evicted by the janitor.
    pub stale_after_secs: u64,
    pub key_source: KeySource,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub activation_ttl_hours: u64,
    pub authentication_ttl_hours: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub limiter: LimiterConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:4000"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_secs)
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl AuthConfig {
    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_hours * 3600)
    }

    pub fn authentication_ttl(&self) -> Duration {
        Duration::from_secs(self.authentication_ttl_hours * 3600)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            env: default_env(),
            shutdown_grace_secs: 20,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite://movies.db".to_string(),
            max_open_conns: 25,
            max_idle_time_secs: 15 * 60,
            query_timeout_secs: 3,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            sweep_interval_secs: 60,
            stale_after_secs: 3 * 60,
            key_source: KeySource::Peer,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            activation_ttl_hours: 72,
            authentication_ttl_hours: 24,
        }
    }
}

pub fn default_bind() -> String {
    "0.0.0.0".to_string()
}

pub fn default_port() -> u16 {
    4000
}

pub fn default_env() -> String {
    "development".to_string()
}
