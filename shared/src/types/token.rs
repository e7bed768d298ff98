use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validator::Validator;

/// Length of a base-32 encoded 16-byte secret without padding.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenScope {
    Activation,
    Authentication,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only representation of a token ever sent to a client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenView {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}
