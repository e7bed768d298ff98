use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::types::TokenScope;
use sqlx::FromRow;

use super::tokens::hash_plaintext;
use super::utils::{from_timestamp, get_timestamp};
use super::{DataError, Database, Result};

/// A registered account. The password hash and version never leave the
/// server.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    created_at: i64,
    name: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i32,
}

impl TryFrom<UserRow> for User {
    type Error = DataError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            created_at: from_timestamp(row.created_at)?,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            activated: row.activated,
            version: row.version,
        })
    }
}

/// Details needed to create an account; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

pub async fn insert(db: &Database, new_user: &NewUser) -> Result<User> {
    let now = get_timestamp();

    let row = db
        .timed(
            sqlx::query_as::<_, UserRow>(
                "INSERT INTO users (created_at, name, email, password_hash, activated)
                 VALUES (?, ?, ?, ?, 0)
                 RETURNING id, created_at, name, email, password_hash, activated, version",
            )
            .bind(now)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .fetch_one(db.pool()),
        )
        .await
        .map_err(DataError::unique_as_duplicate_email)?;

    row.try_into()
}

pub async fn get_by_email(db: &Database, email: &str) -> Result<User> {
    let row = db
        .timed(
            sqlx::query_as::<_, UserRow>(
                "SELECT id, created_at, name, email, password_hash, activated, version
                 FROM users WHERE email = ?",
            )
            .bind(email)
            .fetch_optional(db.pool()),
        )
        .await?;

    row.ok_or(DataError::RecordNotFound)?.try_into()
}

/// The owner of an unexpired token of `scope` whose secret is `plaintext`.
pub async fn get_for_token(db: &Database, scope: TokenScope, plaintext: &str) -> Result<User> {
    let hash = hash_plaintext(plaintext);

    let row = db
        .timed(
            sqlx::query_as::<_, UserRow>(
                "SELECT users.id, users.created_at, users.name, users.email,
                        users.password_hash, users.activated, users.version
                 FROM users
                 INNER JOIN tokens ON users.id = tokens.user_id
                 WHERE tokens.hash = ? AND tokens.scope = ? AND tokens.expiry > ?",
            )
            .bind(hash)
            .bind(scope.as_str())
            .bind(get_timestamp())
            .fetch_optional(db.pool()),
        )
        .await?;

    row.ok_or(DataError::RecordNotFound)?.try_into()
}

/// Conditional write keyed on `user.version`, mirroring `movies::update`.
pub async fn update(db: &Database, user: &mut User) -> Result<()> {
    let new_version = db
        .timed(
            sqlx::query_scalar::<_, i32>(
                "UPDATE users
                 SET name = ?, email = ?, password_hash = ?, activated = ?, version = version + 1
                 WHERE id = ? AND version = ?
                 RETURNING version",
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(db.pool()),
        )
        .await
        .map_err(DataError::unique_as_duplicate_email)?;

    match new_version {
        Some(version) => {
            user.version = version;
            Ok(())
        }
        None => Err(DataError::EditConflict),
    }
}
