use anyhow::Context;
use hyper::{Request, StatusCode};
use serde_json::json;
use shared::types::user::{validate_email, validate_password_plaintext};
use shared::types::{CredentialsInput, TokenScope};
use shared::validator::Validator;
use tracing::{info, warn};

use crate::database::users::{self, User};
use crate::database::utils::verify_password;
use crate::database::{DataError, tokens};
use crate::error::ApiError;
use crate::handlers::http::routes::HandlerResult;
use crate::handlers::http::utils::{RequestBody, deliver_serialized_json, read_json};
use crate::security::Identity;
use crate::state::AppState;

/// POST /v1/tokens/authentication
///
/// Exchanges email + password for a bearer token. Unknown email and wrong
/// password produce the same response.
pub async fn handle_create_authentication_token(
    req: Request<RequestBody>,
    state: AppState,
    _identity: Identity,
) -> HandlerResult {
    let input: CredentialsInput = read_json(req).await?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let user = match users::get_by_email(&state.db, &input.email).await {
        Ok(user) => user,
        Err(DataError::RecordNotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    let hash = user.password_hash.clone();
    let password = input.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .context("Password verification task failed")??;

    if !matches {
        warn!(user_id = user.id, "Password mismatch");
        return Err(ApiError::InvalidCredentials);
    }

    let ttl = state.config.read().await.auth.authentication_ttl();
    let token = tokens::new(&state.db, user.id, ttl, TokenScope::Authentication).await?;
    info!(user_id = user.id, expiry = %token.expiry, "Authentication token issued");

    Ok(deliver_serialized_json(
        &json!({ "authentication_token": token.view() }),
        StatusCode::CREATED,
    )?)
}

/// DELETE /v1/tokens/authentication
///
/// Revokes every authentication token the caller holds, the one used for
/// this request included.
pub async fn handle_revoke_authentication_tokens(
    _req: Request<RequestBody>,
    state: AppState,
    user: User,
) -> HandlerResult {
    let removed = tokens::delete_all_for_user(&state.db, TokenScope::Authentication, user.id).await?;
    info!(user_id = user.id, removed, "Authentication tokens revoked");

    Ok(deliver_serialized_json(
        &json!({ "message": "authentication tokens revoked" }),
        StatusCode::OK,
    )?)
}
