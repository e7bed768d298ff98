//! Command-line flags. Every flag overrides the matching config file value.

use std::path::Path;

use clap::Parser;
use shared::config::validate_config;
use shared::config::load_config as load_config_file;
use shared::types::server_config::{AppConfig, ConfigError};
use tracing::info;

/// Movie API server
#[derive(Debug, Parser)]
#[command(name = "movie-api", version, about = "JSON movie API server", long_about = None)]
pub struct Args {
    /// TOML config file. Built-in defaults are used when it does not exist.
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    /// API server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    pub env: Option<String>,

    /// sqlx SQLite DSN
    #[arg(long)]
    pub db_dsn: Option<String>,

    /// Maximum open database connections
    #[arg(long)]
    pub db_max_open_conns: Option<u32>,

    /// Rate limiter maximum requests per second
    #[arg(long)]
    pub limiter_rps: Option<f64>,

    /// Rate limiter maximum burst
    #[arg(long)]
    pub limiter_burst: Option<u32>,

    /// Enable rate limiter
    #[arg(long)]
    pub limiter_enabled: Option<bool>,

    /// Trusted CORS origins (space separated)
    #[arg(long)]
    pub cors_trusted_origins: Option<String>,
}

impl Args {
    /// Resolve the effective configuration: file (or defaults), then flags,
    /// then validation.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = if Path::new(&self.config).exists() {
            load_config_file(&self.config)?
        } else {
            info!("No config file at {}, using defaults", self.config);
            AppConfig::default()
        };

        self.apply_overrides(&mut config);
        validate_config(&config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(env) = &self.env {
            config.server.env = env.clone();
        }
        if let Some(dsn) = &self.db_dsn {
            config.database.dsn = dsn.clone();
        }
        if let Some(n) = self.db_max_open_conns {
            config.database.max_open_conns = n;
        }
        if let Some(rps) = self.limiter_rps {
            config.limiter.rps = rps;
        }
        if let Some(burst) = self.limiter_burst {
            config.limiter.burst = burst;
        }
        if let Some(enabled) = self.limiter_enabled {
            config.limiter.enabled = enabled;
        }
        if let Some(origins) = &self.cors_trusted_origins {
            config.cors.trusted_origins = origins.split_whitespace().map(str::to_string).collect();
        }
    }
}
