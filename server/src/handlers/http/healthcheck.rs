use hyper::{Request, StatusCode};
use serde_json::json;

use crate::handlers::http::routes::HandlerResult;
use crate::handlers::http::utils::{RequestBody, deliver_serialized_json};
use crate::security::Identity;
use crate::state::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /v1/healthcheck
pub async fn handle_healthcheck(_req: Request<RequestBody>, state: AppState, _identity: Identity) -> HandlerResult {
    let environment = state.config.read().await.server.env.clone();

    Ok(deliver_serialized_json(
        &json!({
            "status": "available",
            "system_info": {
                "environment": environment,
                "version": VERSION,
            }
        }),
        StatusCode::OK,
    )?)
}
