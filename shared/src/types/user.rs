use serde::Deserialize;

use crate::validator::{Validator, is_email};

/// Body of `POST /v1/users`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body of `PUT /v1/users/activated`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUserInput {
    pub token: String,
}

/// Body of `POST /v1/tokens/authentication`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsInput {
    pub email: String,
    pub password: String,
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_registration(v: &mut Validator, input: &RegisterUserInput) {
    v.check(!input.name.is_empty(), "name", "must be provided");
    v.check(input.name.len() <= 500, "name", "must not be more than 500 bytes long");

    validate_email(v, &input.email);
    validate_password_plaintext(v, &input.password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_collects_all_failures() {
        let input = RegisterUserInput {
            name: String::new(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let mut v = Validator::new();
        validate_registration(&mut v, &input);
        let errors = v.into_errors();
        assert_eq!(errors["name"], "must be provided");
        assert_eq!(errors["email"], "must be a valid email address");
        assert_eq!(errors["password"], "must be at least 8 bytes long");
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let input: CredentialsInput = serde_json::from_str(r#"{"email":"a@b.co"}"#).unwrap();
        assert!(input.password.is_empty());
    }
}
