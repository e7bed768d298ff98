mod common;

use std::net::SocketAddr;

use hyper::header;
use hyper::{Method, StatusCode};
use serde_json::json;

use common::{TestApp, build_request, test_config};
use movie_api::database::permissions;

fn moana() -> serde_json::Value {
    json!({
        "title": "Moana",
        "year": 2016,
        "runtime": "107 mins",
        "genres": ["animation", "adventure"],
    })
}

// ---------------------------------------------------------------------------
// Open endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthcheck_reports_environment_and_varies_on_authorization() {
    let app = TestApp::new().await;
    let res = app.request(Method::GET, "/v1/healthcheck", None, None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "available");
    assert_eq!(res.body["system_info"]["environment"], "development");
    assert_eq!(res.body["system_info"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(res.headers[header::VARY], "Authorization");
    assert_eq!(res.headers[header::CONTENT_TYPE], "application/json");
}

#[tokio::test]
async fn malformed_authorization_header_is_rejected_everywhere() {
    let app = TestApp::new().await;
    let mut req = build_request(Method::GET, "/v1/healthcheck", None, None, None);
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0".parse().unwrap());

    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(res.body["error"], "invalid or missing authentication token");
}

#[tokio::test]
async fn unknown_bearer_token_is_rejected() {
    let app = TestApp::new().await;
    let res = app
        .request(Method::GET, "/v1/healthcheck", Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ"), None)
        .await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let app = TestApp::new().await;

    let res = app.request(Method::GET, "/v1/nothing-here", None, None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "the requested resource could not be found");

    let res = app.request(Method::PUT, "/v1/healthcheck", None, None).await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        res.body["error"],
        "the PUT method is not supported for this resource"
    );
}

#[tokio::test]
async fn debug_vars_exposes_counters() {
    let app = TestApp::new().await;
    app.request(Method::GET, "/v1/healthcheck", None, None).await;

    let res = app.request(Method::GET, "/debug/vars", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["version"], env!("CARGO_PKG_VERSION"));
    assert!(res.body["metrics"]["total_requests_received"].as_u64().unwrap() >= 2);
    assert_eq!(res.body["metrics"]["total_responses_sent_by_status"]["200"], 1);
    assert_eq!(res.body["rate_limiter"]["enabled"], false);
    assert!(res.body["database"]["open_connections"].as_u64().is_some());
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registration_validates_and_rejects_duplicates() {
    let app = TestApp::new().await;

    let res = app
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "", "email": "nope", "password": "short" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["name"], "must be provided");
    assert_eq!(res.body["error"]["email"], "must be a valid email address");
    assert_eq!(res.body["error"]["password"], "must be at least 8 bytes long");

    let body = json!({ "name": "Alice", "email": "alice@example.com", "password": "pa55word1234" });
    let res = app.request(Method::POST, "/v1/users", None, Some(body.clone())).await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["user"]["activated"], false);
    assert!(res.body["user"].get("password_hash").is_none());

    let res = app.request(Method::POST, "/v1/users", None, Some(body)).await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        res.body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn activation_token_is_single_use() {
    let app = TestApp::new().await;
    app.request(
        Method::POST,
        "/v1/users",
        None,
        Some(json!({ "name": "Bob", "email": "bob@example.com", "password": "pa55word1234" })),
    )
    .await;
    let token = app.mailer.activation_token_for("bob@example.com").await;

    let res = app
        .request(Method::PUT, "/v1/users/activated", None, Some(json!({ "token": token })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["activated"], true);

    let res = app
        .request(Method::PUT, "/v1/users/activated", None, Some(json!({ "token": token })))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "invalid or expired activation token");
}

#[tokio::test]
async fn login_does_not_reveal_which_credential_was_wrong() {
    let app = TestApp::new().await;
    app.activated_user("carol@example.com").await;

    let wrong_password = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "carol@example.com", "password": "not-the-password" })),
        )
        .await;
    let unknown_email = app
        .request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "pa55word1234" })),
        )
        .await;

    for res in [wrong_password, unknown_email] {
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "invalid authentication credentials");
    }
}

#[tokio::test]
async fn malformed_json_bodies_are_bad_requests() {
    let app = TestApp::new().await;

    let mut req = build_request(Method::POST, "/v1/users", None, None, None);
    *req.body_mut() = movie_api::handlers::http::utils::request_body(r#"{"name": "Alice",}"#);
    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(
        res.body["error"]
            .as_str()
            .unwrap()
            .starts_with("body contains badly-formed JSON")
    );

    let res = app
        .request(Method::POST, "/v1/users", None, Some(json!({ "nickname": "al" })))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "body contains unknown key `nickname`");
}

// ---------------------------------------------------------------------------
// Movies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_movie_access_requires_authentication() {
    let app = TestApp::new().await;
    let res = app.request(Method::GET, "/v1/movies", None, None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        res.body["error"],
        "you must be authenticated to access this resource"
    );
    assert!(res.headers.get(header::WWW_AUTHENTICATE).is_none());
}

#[tokio::test]
async fn full_movie_lifecycle() {
    let app = TestApp::new().await;

    // Inactive accounts can log in but not read.
    app.request(
        Method::POST,
        "/v1/users",
        None,
        Some(json!({ "name": "Dana", "email": "dana@example.com", "password": "pa55word1234" })),
    )
    .await;
    let token = app.login("dana@example.com", "pa55word1234").await;

    let res = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(
        res.body["error"],
        "your user account must be activated to access this resource"
    );

    let activation = app.mailer.activation_token_for("dana@example.com").await;
    let res = app
        .request(Method::PUT, "/v1/users/activated", None, Some(json!({ "token": activation })))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let user_id = res.body["user"]["id"].as_i64().unwrap();

    // Read is granted on registration; the list starts empty.
    let res = app.request(Method::GET, "/v1/movies", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({ "movies": [], "metadata": {} }));

    // Write is not.
    let res = app
        .request(Method::POST, "/v1/movies", Some(&token), Some(moana()))
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    permissions::add_for_user(&app.state.db, user_id, &["movies:write"])
        .await
        .unwrap();

    let res = app
        .request(Method::POST, "/v1/movies", Some(&token), Some(moana()))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let id = res.body["movie"]["id"].as_i64().unwrap();
    assert_eq!(res.headers[header::LOCATION], format!("/v1/movies/{}", id));
    assert_eq!(res.body["movie"]["version"], 1);
    assert_eq!(res.body["movie"]["runtime"], "107 mins");

    let path = format!("/v1/movies/{}", id);
    let res = app.request(Method::GET, &path, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["movie"]["title"], "Moana");

    // Pinned version matches: update goes through and bumps the version.
    let mut req = build_request(
        Method::PATCH,
        &path,
        Some(&token),
        Some(json!({ "year": 2017 })),
        None,
    );
    req.headers_mut()
        .insert("x-expected-version", "1".parse().unwrap());
    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["movie"]["year"], 2017);
    assert_eq!(res.body["movie"]["title"], "Moana");
    assert_eq!(res.body["movie"]["version"], 2);

    // Stale pinned version.
    let mut req = build_request(
        Method::PATCH,
        &path,
        Some(&token),
        Some(json!({ "year": 2018 })),
        None,
    );
    req.headers_mut()
        .insert("x-expected-version", "1".parse().unwrap());
    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(
        res.body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    // Invalid patch is a validation failure, not a write.
    let res = app
        .request(Method::PATCH, &path, Some(&token), Some(json!({ "genres": [] })))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["genres"], "must contain at least 1 genre");

    let res = app
        .request(Method::GET, "/v1/movies?title=moa&genres=adventure", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["movies"].as_array().unwrap().len(), 1);
    assert_eq!(res.body["metadata"]["total_records"], 1);
    assert_eq!(res.body["metadata"]["last_page"], 1);

    let res = app.request(Method::DELETE, &path, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "movie successfully deleted");

    let res = app.request(Method::GET, &path, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.request(Method::DELETE, &path, Some(&token), None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_query_is_validated() {
    let app = TestApp::new().await;
    let (_, token) = app.activated_user("erin@example.com").await;

    let res = app
        .request(
            Method::GET,
            "/v1/movies?page=0&page_size=abc&sort=rating",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["page"], "must be greater than zero");
    assert_eq!(res.body["error"]["page_size"], "must be an integer value");
    assert_eq!(res.body["error"]["sort"], "invalid sort value");
}

#[tokio::test]
async fn non_numeric_movie_id_is_not_found() {
    let app = TestApp::new().await;
    let (_, token) = app.activated_user("frank@example.com").await;

    for path in ["/v1/movies/abc", "/v1/movies/0", "/v1/movies/-4"] {
        let res = app.request(Method::GET, path, Some(&token), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn revoked_tokens_stop_working() {
    let app = TestApp::new().await;
    let (_, token) = app.activated_user("gina@example.com").await;
    let second = app.login("gina@example.com", "pa55word1234").await;

    let res = app
        .request(Method::DELETE, "/v1/tokens/authentication", Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "authentication tokens revoked");

    for t in [&token, &second] {
        let res = app.request(Method::GET, "/v1/movies", Some(t), None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    let res = app
        .request(Method::DELETE, "/v1/tokens/authentication", None, None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clients_over_their_burst_are_rate_limited() {
    let mut config = test_config();
    config.limiter.enabled = true;
    config.limiter.rps = 0.001;
    config.limiter.burst = 2;
    let app = TestApp::with_config(config).await;

    let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    for _ in 0..2 {
        let res = app
            .send(build_request(Method::GET, "/v1/healthcheck", None, None, Some(peer)))
            .await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let res = app
        .send(build_request(Method::GET, "/v1/healthcheck", None, None, Some(peer)))
        .await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.body, json!({ "error": "rate limit exceeded" }));

    let other: SocketAddr = "192.0.2.11:40000".parse().unwrap();
    let res = app
        .send(build_request(Method::GET, "/debug/vars", None, None, Some(other)))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["metrics"]["rate_limited"], 1);
    assert_eq!(res.body["rate_limiter"]["tracked_clients"], 2);
}

#[tokio::test]
async fn trusted_origin_preflight_skips_authentication() {
    let mut config = test_config();
    config.cors.trusted_origins = vec!["https://trusted.example".into()];
    let app = TestApp::with_config(config).await;

    let mut req = build_request(Method::OPTIONS, "/v1/movies/1", None, None, None);
    req.headers_mut()
        .insert(header::ORIGIN, "https://trusted.example".parse().unwrap());
    req.headers_mut().insert(
        header::ACCESS_CONTROL_REQUEST_METHOD,
        "DELETE".parse().unwrap(),
    );

    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://trusted.example"
    );
}
