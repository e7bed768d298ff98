pub mod authenticator;
pub mod client_key;
pub mod metrics;
pub mod permission_gate;
pub mod rate_limiter;

pub use authenticator::{Authenticator, Identity};
pub use client_key::{AddressKey, ClientKey};
pub use metrics::{InFlightGuard, Metrics, MetricsSnapshot};
pub use permission_gate::{PermissionGate, Requirement};
pub use rate_limiter::{LimiterSettings, RateLimiter, RateLimiterStats};
