use std::time::Duration;

use hyper::Method;
use hyper::header::{self, HeaderValue};
use shared::types::server_config::CorsConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Build the CORS layer from the configured trusted origins.
///
/// Only exact origins listed in config are reflected back. Preflight
/// requests (`OPTIONS` with `Access-Control-Request-Method`) from a trusted
/// origin are answered here with 200 and never reach the router. Preflights
/// from any other origin are answered here too, with 200 but no
/// `Access-Control-Allow-Origin`, so the browser still refuses them.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .trusted_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                warn!("Ignoring wildcard CORS origin; list trusted origins explicitly");
                return None;
            }
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(60))
}
