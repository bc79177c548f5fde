//! User accounts for the sync server.
//!
//! Passwords are stored as a SHA-256 digest of a per-user random salt
//! followed by the password.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

/// A registered user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub disabled: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    email: String,
    display_name: Option<String>,
    password_salt: String,
    password_hash: String,
    disabled: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            uid: row.uid,
            email: row.email,
            display_name: row.display_name,
            disabled: row.disabled,
        }
    }
}

/// Errors that can occur in the user store.
#[derive(Debug)]
pub enum UserStoreError {
    /// An account with this email already exists.
    EmailInUse,
    /// Unknown email or wrong password.
    InvalidCredentials,
    /// The account exists but has been disabled.
    Disabled,
    /// Database error.
    Database(sqlx::Error),
}

impl std::fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStoreError::EmailInUse => write!(f, "Email already registered"),
            UserStoreError::InvalidCredentials => write!(f, "Invalid email or password"),
            UserStoreError::Disabled => write!(f, "Account disabled"),
            UserStoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for UserStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UserStoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for UserStoreError {
    fn from(e: sqlx::Error) -> Self {
        UserStoreError::Database(e)
    }
}

fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SQLite-backed user store. Emails are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_row(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
        sqlx::query_as(
            "SELECT uid, email, display_name, password_salt, password_hash, disabled FROM users WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
    }

    /// Registers a new user.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, UserStoreError> {
        let email = email.trim().to_lowercase();
        if self.find_row(&email).await?.is_some() {
            return Err(UserStoreError::EmailInUse);
        }

        let uid = Uuid::new_v4().to_string();
        let salt = generate_salt();
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        sqlx::query(
            r#"
            INSERT INTO users (uid, email, display_name, password_salt, password_hash, disabled, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&uid)
        .bind(&email)
        .bind(&display_name)
        .bind(&salt)
        .bind(hash_password(&salt, password))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!("Registered user {}", email);

        Ok(User {
            uid,
            email,
            display_name,
            disabled: false,
        })
    }

    /// Checks a password and returns the matching user.
    pub async fn verify(&self, email: &str, password: &str) -> Result<User, UserStoreError> {
        let row = self
            .find_row(email)
            .await?
            .ok_or(UserStoreError::InvalidCredentials)?;

        if hash_password(&row.password_salt, password) != row.password_hash {
            return Err(UserStoreError::InvalidCredentials);
        }
        if row.disabled {
            return Err(UserStoreError::Disabled);
        }
        Ok(row.into())
    }

    /// Get a user by uid.
    pub async fn get(&self, uid: &str) -> Result<Option<User>, UserStoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT uid, email, display_name, password_salt, password_hash, disabled FROM users WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Enables or disables an account. Returns `false` for an unknown email.
    pub async fn set_disabled(&self, email: &str, disabled: bool) -> Result<bool, UserStoreError> {
        let result = sqlx::query("UPDATE users SET disabled = ? WHERE email = ?")
            .bind(disabled)
            .bind(email.trim().to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
