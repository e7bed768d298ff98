use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Response, StatusCode, Uri};
use serde::Serialize;
use serde_json::{Map, Value};
use shared::types::ErrorResponse;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::error::ApiError;

pub type ResponseBody = BoxBody<Bytes, Infallible>;
pub type JsonResponse = Response<ResponseBody>;

pub fn full<T: Into<Bytes>>(chunk: T) -> ResponseBody {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// This is the primary helper all handlers should use instead of
/// writing their own one-off serialization + response-building blocks.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<JsonResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))?;

    Ok(response)
}

/// Deliver `{"<key>": data}`.
pub fn deliver_envelope<T: Serialize>(key: &str, data: &T, status: StatusCode) -> Result<JsonResponse> {
    let value = serde_json::to_value(data).context("Failed to serialize envelope")?;
    let mut envelope = Map::with_capacity(1);
    envelope.insert(key.to_string(), value);
    deliver_serialized_json(&Value::Object(envelope), status)
}

/// Log `err` against the request and render it.
pub fn deliver_error(err: &ApiError, method: &Method, uri: &Uri) -> JsonResponse {
    err.log(method, uri);
    render_error(err)
}

/// Render `err` as `{"error": ...}` without logging. Falls back to a bare
/// 500 if the body cannot be built.
pub fn render_error(err: &ApiError) -> JsonResponse {
    let body = ErrorResponse::with_value(err.client_message());
    let mut response = match deliver_serialized_json(&body, err.status()) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to render error response: {:#}", e);
            fallback_server_error()
        }
    };

    if err.is_bearer_challenge() {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

fn fallback_server_error() -> JsonResponse {
    let mut response = Response::new(full(Bytes::from_static(
        br#"{"error":"the server encountered a problem and could not process your request"}"#,
    )));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
