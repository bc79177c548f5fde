use async_trait::async_trait;
use chrono::Utc;
use fueltrack_core::cache::{CacheError, LocalCache};
use sqlx::SqlitePool;

/// Guest-mode cache stored in the client database.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Keys currently stored.
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM cache ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

fn storage_error(e: sqlx::Error) -> CacheError {
    CacheError::Storage(e.to_string())
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
