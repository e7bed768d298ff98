use std::sync::Arc;

use shared::config::LiveConfig;
use shared::types::server_config::AppConfig;

use crate::database::Database;
use crate::mailer::Mailer;
use crate::security::{Authenticator, LimiterSettings, Metrics, PermissionGate, RateLimiter};

/// Everything a handler may touch. Cheap to clone; every field is a handle.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: LiveConfig,
    pub db: Database,
    pub authenticator: Authenticator,
    pub gate: PermissionGate,
    pub limiter: RateLimiter,
    pub metrics: Metrics,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire the services together. Starts the rate limiter janitor, so this
    /// must run inside a tokio runtime.
    pub fn new(config: AppConfig, db: Database, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = RateLimiter::start(LimiterSettings::from(&config.limiter));

        Self {
            authenticator: Authenticator::new(db.clone()),
            gate: PermissionGate::new(db.clone()),
            config: LiveConfig::new(config),
            db,
            limiter,
            metrics: Metrics::new(),
            mailer,
        }
    }
}
