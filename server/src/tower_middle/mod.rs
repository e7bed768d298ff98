/// Tower middleware module
///
/// Layers wrapped around the router, outermost first:
/// - Metrics tracking
/// - Panic recovery
/// - CORS (tower-http)
/// - Rate limiting
pub mod tower_cors;
pub mod tower_metrics;
pub mod tower_rate_limiter;
pub mod tower_recover_panic;

pub use tower_cors::cors_layer;
pub use tower_metrics::{MetricsLayer, MetricsService};
pub use tower_rate_limiter::{RateLimiterLayer, RateLimiterService};
pub use tower_recover_panic::{RecoverPanicLayer, RecoverPanicService};
