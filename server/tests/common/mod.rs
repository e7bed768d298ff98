#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::header::{self, HeaderMap};
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use movie_api::app::{AppService, build_service};
use movie_api::database::Database;
use movie_api::handlers::http::build_api_router;
use movie_api::handlers::http::utils::{empty_body, request_body};
use movie_api::mailer::{ActivationMessage, Mailer};
use movie_api::security::AddressKey;
use movie_api::state::AppState;
use shared::types::server_config::{AppConfig, KeySource};

/// Keeps every activation message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<ActivationMessage>>,
}

impl Mailer for RecordingMailer {
    fn send_activation(&self, message: &ActivationMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

impl RecordingMailer {
    /// Wait for the background dispatch to deliver a token for `email`.
    pub async fn activation_token_for(&self, email: &str) -> String {
        for _ in 0..200 {
            if let Some(msg) = self
                .sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|m| m.recipient == email)
            {
                return msg.token.token.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no activation email sent to {}", email);
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: AppState,
    pub service: AppService,
    pub mailer: Arc<RecordingMailer>,
}

/// Config for tests: rate limiting off unless a test turns it on.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.limiter.enabled = false;
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = Database::in_memory().await.unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(config, db, mailer.clone());
        let service = build_service(
            state.clone(),
            Arc::new(build_api_router()),
            AddressKey::shared(KeySource::Peer),
        )
        .await;

        Self {
            state,
            service,
            mailer,
        }
    }

    pub async fn send(&self, req: Request<movie_api::handlers::http::utils::RequestBody>) -> TestResponse {
        let res = self.service.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.send(build_request(method, path, token, body, None)).await
    }

    /// Register, activate and log in. Returns the user id and bearer token.
    pub async fn activated_user(&self, email: &str) -> (i64, String) {
        let res = self
            .request(
                Method::POST,
                "/v1/users",
                None,
                Some(serde_json::json!({
                    "name": "Test User",
                    "email": email,
                    "password": "pa55word1234",
                })),
            )
            .await;
        assert_eq!(res.status, StatusCode::ACCEPTED, "{}", res.body);
        let user_id = res.body["user"]["id"].as_i64().unwrap();

        let activation = self.mailer.activation_token_for(email).await;
        let res = self
            .request(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(serde_json::json!({ "token": activation })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);

        (user_id, self.login(email, "pa55word1234").await)
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let res = self
            .request(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(serde_json::json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

pub fn build_request(
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
    peer: Option<SocketAddr>,
) -> Request<movie_api::handlers::http::utils::RequestBody> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let mut req = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(request_body(json.to_string()))
            .unwrap(),
        None => builder.body(empty_body()).unwrap(),
    };

    if let Some(peer) = peer {
        req.extensions_mut().insert(peer);
    }
    req
}
