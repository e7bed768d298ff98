use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(&contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

/// Reject configurations the server cannot run with.
///
/// Called by `load_config` and again by the binary after command-line
/// overrides have been applied.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.database.dsn.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("database.dsn cannot be empty".into()));
    }

    if config.database.query_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.query_timeout_secs must be greater than 0".into(),
        ));
    }

    if config.database.max_open_conns == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.max_open_conns must be greater than 0".into(),
        ));
    }

    if config.limiter.enabled && !(config.limiter.rps > 0.0 && config.limiter.rps.is_finite()) {
        return Err(ConfigError::InvalidConfig(
            "limiter.rps must be a positive number when the limiter is enabled".into(),
        ));
    }

    if config.limiter.sweep_interval_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "limiter.sweep_interval_secs must be greater than 0".into(),
        ));
    }

    if config.auth.activation_ttl_hours == 0 || config.auth.authentication_ttl_hours == 0 {
        return Err(ConfigError::InvalidConfig(
            "token TTLs must be greater than 0".into(),
        ));
    }

    Ok(())
}
