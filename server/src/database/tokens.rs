use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use shared::types::{TokenScope, TokenView};

use super::utils::expiry_after;
use super::{Database, Result};

/// RFC 4648 base-32 alphabet.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Bytes of entropy behind every token secret.
const SECRET_BYTES: usize = 16;

/// A freshly minted token. Only `hash` is ever persisted; `plaintext` exists
/// in memory just long enough to hand back to the client.
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    pub fn view(&self) -> TokenView {
        TokenView {
            token: self.plaintext.clone(),
            expiry: self.expiry,
        }
    }
}

/// Base-32 without padding; 16 bytes become 26 characters.
pub fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// SHA-256 of the plaintext secret, as stored in `tokens.hash`.
pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Mint a token from 16 bytes of OS randomness. Nothing is stored.
pub fn generate_token(user_id: i64, ttl: Duration, scope: TokenScope) -> Result<Token> {
    let mut secret = [0u8; SECRET_BYTES];
    OsRng.try_fill_bytes(&mut secret)?;

    let plaintext = encode_base32(&secret);
    let hash = hash_plaintext(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        expiry: expiry_after(ttl),
        scope,
    })
}

/// Generate and persist a token in one step.
pub async fn new(db: &Database, user_id: i64, ttl: Duration, scope: TokenScope) -> Result<Token> {
    let token = generate_token(user_id, ttl, scope)?;
    insert(db, &token).await?;
    Ok(token)
}

pub async fn insert(db: &Database, token: &Token) -> Result<()> {
    db.timed(
        sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES (?, ?, ?, ?)")
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry.timestamp())
            .bind(token.scope.as_str())
            .execute(db.pool()),
    )
    .await?;
    Ok(())
}

/// Remove every token of `scope` owned by `user_id`, returning how many went.
pub async fn delete_all_for_user(db: &Database, scope: TokenScope, user_id: i64) -> Result<u64> {
    let result = db
        .timed(
            sqlx::query("DELETE FROM tokens WHERE scope = ? AND user_id = ?")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(db.pool()),
        )
        .await?;
    Ok(result.rows_affected())
}
