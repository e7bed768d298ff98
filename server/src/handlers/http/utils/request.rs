use std::collections::HashMap;
use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::header::HeaderMap;
use hyper::{Request, Uri};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use shared::validator::Validator;

use crate::error::ApiError;

/// Request body type every handler sees. The connection handler boxes
/// hyper's `Incoming` into this, mapping transport errors to `io::Error`, so
/// handlers can be driven without a socket.
pub type RequestBody = BoxBody<Bytes, std::io::Error>;

/// Largest JSON body a handler will read.
pub const MAX_BODY_BYTES: usize = 1_048_576;

pub fn request_body<T: Into<Bytes>>(chunk: T) -> RequestBody {
    Full::new(chunk.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}

pub fn empty_body() -> RequestBody {
    request_body(Bytes::new())
}

/// Decode exactly one JSON value from the body into `T`, translating every
/// failure into a client-readable 400.
pub async fn read_json<T: DeserializeOwned>(req: Request<RequestBody>) -> Result<T, ApiError> {
    let limited = Limited::new(req.into_body(), MAX_BODY_BYTES);
    let bytes = match limited.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(ApiError::BadRequest(format!(
                "body must not be larger than {} bytes",
                MAX_BODY_BYTES
            )));
        }
        Err(e) => {
            return Err(ApiError::BadRequest(format!("unable to read request body: {}", e)));
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(describe_json_error(&e)))
}

fn describe_json_error(err: &serde_json::Error) -> String {
    let text = err.to_string();
    match err.classify() {
        Category::Syntax if text.starts_with("trailing characters") => {
            "body must only contain a single JSON value".to_string()
        }
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            err.line(),
            err.column()
        ),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => match text.strip_prefix("unknown field ") {
            Some(rest) => {
                let field = rest.split(',').next().unwrap_or(rest);
                format!("body contains unknown key {}", field)
            }
            None => format!("body contains incorrect JSON type: {}", text),
        },
        Category::Io => "unable to read request body".to_string(),
    }
}

/// The `:id` segment at the end of the path. Non-numeric and non-positive
/// ids are reported as not found.
pub fn read_id_param(path: &str) -> Result<i64, ApiError> {
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<i64>().ok())
        .filter(|id| *id >= 1)
        .ok_or(ApiError::NotFound)
}

/// `X-Expected-Version`, when the client sent one.
pub fn read_expected_version(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-expected-version")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Decoded query-string parameters; the last occurrence of a key wins.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn from_uri(uri: &Uri) -> Self {
        let pairs = form_urlencoded::parse(uri.query().unwrap_or("").as_bytes()).into_owned();
        Self(pairs.collect())
    }

    pub fn read_string(&self, key: &str, default: &str) -> String {
        match self.0.get(key) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }

    pub fn read_csv(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.0.get(key) {
            Some(value) if !value.is_empty() => value.split(',').map(str::to_string).collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parse an integer, recording a validation error and returning
    /// `default` when the value is not one.
    pub fn read_int(&self, key: &str, default: i64, v: &mut Validator) -> i64 {
        match self.0.get(key) {
            Some(value) if !value.is_empty() => match value.parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    v.add_error(key, "must be an integer value");
                    default
                }
            },
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct TitleOnly {
        title: String,
    }

    fn post(body: &str) -> Request<RequestBody> {
        Request::builder()
            .method("POST")
            .uri("/v1/movies")
            .body(request_body(body.to_string()))
            .unwrap()
    }

    async fn bad_request_message(body: &str) -> String {
        match read_json::<TitleOnly>(post(body)).await {
            Err(ApiError::BadRequest(message)) => message,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn transport_errors_are_bad_requests() {
        use futures_util::stream;
        use http_body_util::StreamBody;
        use hyper::body::Frame;

        let body = StreamBody::new(stream::iter(vec![Err::<Frame<Bytes>, _>(
            std::io::Error::other("connection reset"),
        )]))
        .boxed();
        let req = Request::builder().method("POST").uri("/v1/movies").body(body).unwrap();

        let fut = read_json::<TitleOnly>(req);
        assert_send(&fut);
        match fut.await {
            Err(ApiError::BadRequest(message)) => {
                assert!(message.starts_with("unable to read request body"), "{}", message)
            }
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reads_a_single_value() {
        let parsed: TitleOnly = read_json(post(r#"{"title": "Up"}"#)).await.unwrap();
        assert_eq!(parsed.title, "Up");
    }

    #[tokio::test]
    async fn json_failures_are_described() {
        assert_eq!(bad_request_message("").await, "body must not be empty");
        assert_eq!(
            bad_request_message(r#"{"title": "Up"} {}"#).await,
            "body must only contain a single JSON value"
        );
        assert_eq!(
            bad_request_message(r#"{"title": "Up", "rating": 5}"#).await,
            "body contains unknown key `rating`"
        );
        assert!(bad_request_message(r#"{"title": 5}"#)
            .await
            .starts_with("body contains incorrect JSON type"));
        assert_eq!(bad_request_message(r#"{"title": "#).await, "body contains badly-formed JSON");
        assert!(bad_request_message(r#"{"title" "Up"}"#)
            .await
            .starts_with("body contains badly-formed JSON (at line 1"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let huge = format!(r#"{{"title": "{}"}}"#, "x".repeat(MAX_BODY_BYTES));
        assert_eq!(
            bad_request_message(&huge).await,
            format!("body must not be larger than {} bytes", MAX_BODY_BYTES)
        );
    }

    #[test]
    fn id_param_must_be_positive_integer() {
        assert_eq!(read_id_param("/v1/movies/42").unwrap(), 42);
        assert!(matches!(read_id_param("/v1/movies/0"), Err(ApiError::NotFound)));
        assert!(matches!(read_id_param("/v1/movies/abc"), Err(ApiError::NotFound)));
    }

    #[test]
    fn query_params_fall_back_and_flag_bad_integers() {
        let uri: Uri = "/v1/movies?title=black%20panther&genres=action,adventure&page=x"
            .parse()
            .unwrap();
        let query = QueryParams::from_uri(&uri);
        let mut v = Validator::new();

        assert_eq!(query.read_string("title", ""), "black panther");
        assert_eq!(query.read_csv("genres", &[]), vec!["action", "adventure"]);
        assert_eq!(query.read_string("sort", "id"), "id");
        assert_eq!(query.read_int("page", 1, &mut v), 1);
        assert_eq!(query.read_int("page_size", 20, &mut v), 20);
        assert_eq!(v.errors()["page"], "must be an integer value");
    }
}
