use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error envelope returned for every rejected request: `{"error": ...}`.
///
/// `error` is a plain message for most failures and a field → message map
/// for validation failures.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: Value,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: Value::String(message.to_string()),
        }
    }

    pub fn with_value(error: Value) -> Self {
        Self { error }
    }
}
