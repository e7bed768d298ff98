use std::collections::BTreeMap;

use hyper::{Method, StatusCode, Uri};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

use crate::database::DataError;

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Every way a request can fail. Each variant maps to exactly one status and
/// client-facing message; internal detail stays in the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("malformed Authorization header")]
    InvalidCredentialFormat,

    #[error("unknown or expired bearer token")]
    InvalidOrExpiredCredential,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("account not activated")]
    AccountInactive,

    #[error("missing permission")]
    PermissionDenied,

    #[error("email or password did not match")]
    InvalidCredentials,

    #[error("edit conflict")]
    EditConflict,

    #[error("resource not found")]
    NotFound,

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("failed validation: {0:?}")]
    FailedValidation(BTreeMap<String, String>),

    #[error("storage failure: {0}")]
    Storage(DataError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::RecordNotFound => ApiError::NotFound,
            DataError::EditConflict => ApiError::EditConflict,
            other => ApiError::Storage(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCredentialFormat
            | ApiError::InvalidOrExpiredCredential
            | ApiError::AuthenticationRequired
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccountInactive | ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The value placed under `"error"` in the response body.
    pub fn client_message(&self) -> Value {
        match self {
            ApiError::RateLimitExceeded => json!("rate limit exceeded"),
            ApiError::InvalidCredentialFormat | ApiError::InvalidOrExpiredCredential => {
                json!("invalid or missing authentication token")
            }
            ApiError::AuthenticationRequired => {
                json!("you must be authenticated to access this resource")
            }
            ApiError::AccountInactive => {
                json!("your user account must be activated to access this resource")
            }
            ApiError::PermissionDenied => json!(
                "your user account doesn't have the necessary permissions to access this resource"
            ),
            ApiError::InvalidCredentials => json!("invalid authentication credentials"),
            ApiError::EditConflict => {
                json!("unable to update the record due to an edit conflict, please try again")
            }
            ApiError::NotFound => json!("the requested resource could not be found"),
            ApiError::MethodNotAllowed(method) => {
                json!(format!("the {} method is not supported for this resource", method))
            }
            ApiError::BadRequest(message) => json!(message),
            ApiError::FailedValidation(errors) => json!(errors),
            ApiError::Storage(_) | ApiError::Internal(_) => json!(SERVER_ERROR_MESSAGE),
        }
    }

    /// Whether the response should carry `WWW-Authenticate: Bearer`.
    pub fn is_bearer_challenge(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidCredentialFormat | ApiError::InvalidOrExpiredCredential
        )
    }

    /// Server faults are logged as errors, client mistakes as warnings.
    pub fn log(&self, method: &Method, uri: &Uri) {
        if self.status().is_server_error() {
            error!(request_method = %method, request_url = %uri, "{}", self);
        } else {
            warn!(request_method = %method, request_url = %uri, status = self.status().as_u16(), "{}", self);
        }
    }
}
