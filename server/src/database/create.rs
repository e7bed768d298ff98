use tracing::info;

use super::{Database, Result};

/// Current schema version, stored in `PRAGMA user_version`. Bump this whenever
/// the schema changes and extend `create_tables` with the step from the
/// previous version.
pub const SCHEMA_VERSION: i64 = 1;

/// Permission codes every database starts with.
pub const SEEDED_PERMISSIONS: [&str; 2] = ["movies:read", "movies:write"];

const SCHEMA: &[&str] = &[
    // Timestamps are Unix seconds; genres is a JSON array of strings.
    "CREATE TABLE IF NOT EXISTS movies (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at INTEGER NOT NULL,
        title      TEXT    NOT NULL,
        year       INTEGER NOT NULL,
        runtime    INTEGER NOT NULL,
        genres     TEXT    NOT NULL DEFAULT '[]',
        version    INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at    INTEGER NOT NULL,
        name          TEXT    NOT NULL,
        email         TEXT    NOT NULL UNIQUE COLLATE NOCASE,
        password_hash TEXT    NOT NULL,
        activated     INTEGER NOT NULL DEFAULT 0,
        version       INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS tokens (
        hash    BLOB    PRIMARY KEY,
        user_id INTEGER NOT NULL,
        expiry  INTEGER NOT NULL,
        scope   TEXT    NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS permissions (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT    NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS users_permissions (
        user_id       INTEGER NOT NULL,
        permission_id INTEGER NOT NULL,
        PRIMARY KEY (user_id, permission_id),
        FOREIGN KEY (user_id)       REFERENCES users(id)       ON DELETE CASCADE,
        FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_movies_title   ON movies(title)",
    "CREATE INDEX IF NOT EXISTS idx_tokens_user_id ON tokens(user_id, scope)",
];

/// Initialize the schema on a fresh database. Databases already at
/// `SCHEMA_VERSION` are left alone.
pub async fn create_tables(db: &Database) -> Result<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(db.pool())
        .await?;

    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating schema from v{} to v{}", current, SCHEMA_VERSION);

    let mut tx = db.pool().begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    for code in SEEDED_PERMISSIONS {
        sqlx::query("INSERT OR IGNORE INTO permissions (code) VALUES (?)")
            .bind(code)
            .execute(&mut *tx)
            .await?;
    }
    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}
