use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{DataError, Result};

/// Current Unix timestamp in seconds
pub fn get_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert a stored Unix timestamp back to a `DateTime`.
pub fn from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| DataError::Corrupt(format!("timestamp {} out of range", secs)))
}

/// Now plus `ttl`, saturating at the latest representable instant.
pub fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use rand::rngs::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
}

/// Verify a password against its hash
pub fn verify_password(hash: &str, password: &str) -> anyhow::Result<bool> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordVerifier},
    };

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// String lists (movie genres, permission code sets) travel to SQLite as a
/// JSON array in a TEXT value.
pub fn to_json_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items).map_err(|e| DataError::Corrupt(format!("string list: {}", e)))
}

pub fn from_json_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| DataError::Corrupt(format!("string list {:?}: {}", raw, e)))
}
