use chrono::Utc;
use hyper::{Request, StatusCode};
use serde_json::json;

use crate::handlers::http::healthcheck::VERSION;
use crate::handlers::http::routes::HandlerResult;
use crate::handlers::http::utils::{RequestBody, deliver_serialized_json};
use crate::security::Identity;
use crate::state::AppState;

/// GET /debug/vars
///
/// Point-in-time counters: request totals and latencies, rate limiter
/// occupancy and pool usage.
pub async fn handle_debug_vars(_req: Request<RequestBody>, state: AppState, _identity: Identity) -> HandlerResult {
    let metrics = state.metrics.snapshot().await;
    let limiter = state.limiter.stats().await;
    let pool = state.db.pool();

    Ok(deliver_serialized_json(
        &json!({
            "version": VERSION,
            "timestamp": Utc::now().timestamp(),
            "database": {
                "open_connections": pool.size(),
                "idle": pool.num_idle(),
            },
            "rate_limiter": limiter,
            "metrics": metrics,
        }),
        StatusCode::OK,
    )?)
}
