use hyper::header::HeaderValue;
use shared::types::TokenScope;
use shared::types::token::validate_token_plaintext;
use shared::validator::Validator;
use tracing::debug;

use crate::database::users::{self, User};
use crate::database::{DataError, Database};
use crate::error::ApiError;

/// Who is making a request. Resolved once per request before routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

/// Turns an `Authorization` header into an [`Identity`].
#[derive(Debug, Clone)]
pub struct Authenticator {
    db: Database,
}

impl Authenticator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// A missing or empty header is anonymous. Anything present must be
    /// exactly `Bearer <token>` and name a live authentication token.
    pub async fn resolve(&self, header: Option<&HeaderValue>) -> Result<Identity, ApiError> {
        let Some(value) = header else {
            return Ok(Identity::Anonymous);
        };
        let value = value
            .to_str()
            .map_err(|_| ApiError::InvalidCredentialFormat)?;
        if value.is_empty() {
            return Ok(Identity::Anonymous);
        }

        let secret = parse_bearer(value)?;

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, secret);
        if !v.valid() {
            debug!("Bearer token failed shape validation");
            return Err(ApiError::InvalidCredentialFormat);
        }

        match users::get_for_token(&self.db, TokenScope::Authentication, secret).await {
            Ok(user) => Ok(Identity::User(user)),
            Err(DataError::RecordNotFound) => Err(ApiError::InvalidOrExpiredCredential),
            Err(e) => Err(e.into()),
        }
    }
}

/// Split `Bearer <token>` on single spaces; exactly two parts are accepted.
pub fn parse_bearer(value: &str) -> Result<&str, ApiError> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(ApiError::InvalidCredentialFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tokens;
    use crate::database::users::NewUser;
    use std::time::Duration;

    async fn authenticator_with_token() -> (Authenticator, User, String) {
        let db = Database::in_memory().await.unwrap();
        let user = users::insert(
            &db,
            &NewUser {
                name: "Dana".to_string(),
                email: "dana@example.com".to_string(),
                password_hash: "x".to_string(),
            },
        )
        .await
        .unwrap();
        let token = tokens::new(&db, user.id, Duration::from_secs(600), TokenScope::Authentication)
            .await
            .unwrap();
        (Authenticator::new(db), user, token.plaintext)
    }

    #[test]
    fn bearer_parsing_is_strict() {
        assert_eq!(parse_bearer("Bearer abc").unwrap(), "abc");
        assert!(parse_bearer("bearer abc").is_err());
        assert!(parse_bearer("Bearer").is_err());
        assert!(parse_bearer("Bearer  abc").is_err());
        assert!(parse_bearer("Bearer abc def").is_err());
        assert!(parse_bearer("Basic abc").is_err());
    }

    #[tokio::test]
    async fn missing_or_empty_header_is_anonymous() {
        let (auth, _, _) = authenticator_with_token().await;
        assert_eq!(auth.resolve(None).await.unwrap(), Identity::Anonymous);
        assert_eq!(
            auth.resolve(Some(&HeaderValue::from_static(""))).await.unwrap(),
            Identity::Anonymous
        );
    }

    #[tokio::test]
    async fn live_token_resolves_to_its_owner() {
        let (auth, user, secret) = authenticator_with_token().await;
        let header = HeaderValue::from_str(&format!("Bearer {}", secret)).unwrap();
        assert_eq!(auth.resolve(Some(&header)).await.unwrap(), Identity::User(user));
    }

    #[tokio::test]
    async fn wrong_length_secret_is_a_format_error() {
        let (auth, _, _) = authenticator_with_token().await;
        let header = HeaderValue::from_static("Bearer TOOSHORT");
        assert!(matches!(
            auth.resolve(Some(&header)).await,
            Err(ApiError::InvalidCredentialFormat)
        ));
    }

    #[tokio::test]
    async fn unknown_secret_is_rejected() {
        let (auth, _, _) = authenticator_with_token().await;
        let header = HeaderValue::from_static("Bearer AAAAAAAAAAAAAAAAAAAAAAAAAA");
        assert!(matches!(
            auth.resolve(Some(&header)).await,
            Err(ApiError::InvalidOrExpiredCredential)
        ));
    }
}
