//! Bearer session tokens.
//!
//! A token is issued on sign-up or login and stays valid until logout.
//! Tokens of disabled accounts stop resolving.

use chrono::Utc;
use rand::Rng;
use sqlx::SqlitePool;

use super::users::User;

/// SQLite-backed session token store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    uid: String,
    email: String,
    display_name: Option<String>,
    disabled: bool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issues a new token for `uid`.
    pub async fn create(&self, uid: &str) -> Result<String, sqlx::Error> {
        let token = generate_token();
        sqlx::query("INSERT INTO sessions (token, uid, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(uid)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    /// Returns the user a token belongs to, if the token is known and the
    /// account is active.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<SessionUserRow> = sqlx::query_as(
            r#"
            SELECT users.uid, users.email, users.display_name, users.disabled
            FROM sessions JOIN users ON users.uid = sessions.uid
            WHERE sessions.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.filter(|r| !r.disabled).map(|r| User {
            uid: r.uid,
            email: r.email,
            display_name: r.display_name,
            disabled: r.disabled,
        }))
    }

    /// Revokes a token. Returns `false` if it was unknown.
    pub async fn revoke(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Generates a secure random token.
///
/// Returns 32 random bytes encoded as base64url (no padding).
pub fn generate_token() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
