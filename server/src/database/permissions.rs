use super::utils::to_json_list;
use super::{Database, Result};

/// Permission codes held by one user, e.g. `movies:read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|held| held == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

pub async fn get_all_for_user(db: &Database, user_id: i64) -> Result<Permissions> {
    let codes = db
        .timed(
            sqlx::query_scalar::<_, String>(
                "SELECT permissions.code
                 FROM permissions
                 INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                 WHERE users_permissions.user_id = ?
                 ORDER BY permissions.code",
            )
            .bind(user_id)
            .fetch_all(db.pool()),
        )
        .await?;

    Ok(Permissions(codes))
}

/// Grant `codes` to `user_id`. Unknown codes are skipped and codes already
/// held are left alone.
pub async fn add_for_user(db: &Database, user_id: i64, codes: &[&str]) -> Result<()> {
    let owned: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    let wanted = to_json_list(&owned)?;

    db.timed(
        sqlx::query(
            "INSERT OR IGNORE INTO users_permissions (user_id, permission_id)
             SELECT ?, permissions.id FROM permissions
             WHERE permissions.code IN (SELECT value FROM json_each(?))",
        )
        .bind(user_id)
        .bind(&wanted)
        .execute(db.pool()),
    )
    .await?;
    Ok(())
}
