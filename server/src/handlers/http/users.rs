use anyhow::Context;
use hyper::{Request, StatusCode};
use shared::types::token::validate_token_plaintext;
use shared::types::user::validate_registration;
use shared::types::{ActivateUserInput, RegisterUserInput, TokenScope};
use shared::validator::Validator;
use tracing::info;

use crate::database::users::{self, NewUser};
use crate::database::utils::hash_password;
use crate::database::{DataError, permissions, tokens};
use crate::error::ApiError;
use crate::handlers::http::routes::HandlerResult;
use crate::handlers::http::utils::{RequestBody, deliver_envelope, read_json};
use crate::mailer::{self, ActivationMessage};
use crate::security::Identity;
use crate::state::AppState;

/// Granted to every new account.
const DEFAULT_PERMISSIONS: [&str; 1] = ["movies:read"];

fn single_field_error(field: &str, message: &str) -> ApiError {
    let mut v = Validator::new();
    v.add_error(field, message);
    ApiError::FailedValidation(v.into_errors())
}

/// POST /v1/users
///
/// Creates an inactive account, grants the default permissions and hands an
/// activation token to the mailer in the background.
pub async fn handle_register_user(req: Request<RequestBody>, state: AppState, _identity: Identity) -> HandlerResult {
    let input: RegisterUserInput = read_json(req).await?;

    let mut v = Validator::new();
    validate_registration(&mut v, &input);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let RegisterUserInput { name, email, password } = input;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")??;

    let new_user = NewUser {
        name,
        email,
        password_hash,
    };
    let user = match users::insert(&state.db, &new_user).await {
        Ok(user) => user,
        Err(DataError::DuplicateEmail) => {
            return Err(single_field_error(
                "email",
                "a user with this email address already exists",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    permissions::add_for_user(&state.db, user.id, &DEFAULT_PERMISSIONS).await?;

    let ttl = state.config.read().await.auth.activation_ttl();
    let token = tokens::new(&state.db, user.id, ttl, TokenScope::Activation).await?;

    info!(user_id = user.id, "User registered");
    mailer::dispatch_activation(
        state.mailer.clone(),
        ActivationMessage {
            recipient: user.email.clone(),
            name: user.name.clone(),
            user_id: user.id,
            token: token.view(),
        },
    );

    Ok(deliver_envelope("user", &user, StatusCode::ACCEPTED)?)
}

/// PUT /v1/users/activated
pub async fn handle_activate_user(req: Request<RequestBody>, state: AppState, _identity: Identity) -> HandlerResult {
    let input: ActivateUserInput = read_json(req).await?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let mut user = match users::get_for_token(&state.db, TokenScope::Activation, &input.token).await {
        Ok(user) => user,
        Err(DataError::RecordNotFound) => {
            return Err(single_field_error("token", "invalid or expired activation token"));
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    users::update(&state.db, &mut user).await?;

    tokens::delete_all_for_user(&state.db, TokenScope::Activation, user.id).await?;
    info!(user_id = user.id, "User activated");

    Ok(deliver_envelope("user", &user, StatusCode::OK)?)
}
