//! Server-side document storage.
//!
//! Every record is one JSON document in the `documents` table, keyed by
//! collection and client-generated id, with the owner copied into its own
//! column for filtering.

use chrono::Utc;
use fueltrack_core::Collection;
use serde_json::Value;
use sqlx::SqlitePool;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// Database error.
    Database(sqlx::Error),
    /// A stored body that is not valid JSON.
    Corrupt(String, serde_json::Error),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::Database(e) => write!(f, "Database error: {}", e),
            ServerStorageError::Corrupt(id, e) => {
                write!(f, "Stored document {} is not valid JSON: {}", id, e)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::Database(e) => Some(e),
            ServerStorageError::Corrupt(_, e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for ServerStorageError {
    fn from(e: sqlx::Error) -> Self {
        ServerStorageError::Database(e)
    }
}

/// SQLite-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All of `owner_id`'s documents in a collection, ordered by id.
    pub async fn list(
        &self,
        collection: Collection,
        owner_id: &str,
    ) -> Result<Vec<Value>, ServerStorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, body FROM documents WHERE collection = ? AND owner_id = ? ORDER BY id",
        )
        .bind(collection.name())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, body)| {
                serde_json::from_str(&body).map_err(|e| ServerStorageError::Corrupt(id, e))
            })
            .collect()
    }

    /// Owner of a stored document, or `None` if there is no such document.
    pub async fn owner_of(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<String>, ServerStorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT owner_id FROM documents WHERE collection = ? AND id = ?")
                .bind(collection.name())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(owner,)| owner))
    }

    /// Inserts or replaces a document.
    pub async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        owner_id: &str,
        document: &Value,
    ) -> Result<(), ServerStorageError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, owner_id, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                owner_id = excluded.owner_id,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection.name())
        .bind(id)
        .bind(owner_id)
        .bind(document.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes a document. Returns `false` if it did not exist.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, ServerStorageError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::init_server_db;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (DocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_server_db(&temp_dir.path().join("server.db"))
            .await
            .unwrap();
        (DocumentStore::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_list_is_owner_scoped() {
        let (store, _dir) = setup().await;
        store
            .upsert(Collection::Vehicles, "a", "u1", &json!({"id": "a", "ownerId": "u1"}))
            .await
            .unwrap();
        store
            .upsert(Collection::Vehicles, "b", "u2", &json!({"id": "b", "ownerId": "u2"}))
            .await
            .unwrap();

        let docs = store.list(Collection::Vehicles, "u1").await.unwrap();
        assert_eq!(docs, vec![json!({"id": "a", "ownerId": "u1"})]);
        assert!(store.list(Collection::FuelEntries, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let (store, _dir) = setup().await;
        store
            .upsert(Collection::FuelEntries, "e1", "u1", &json!({"id": "e1", "liters": 4}))
            .await
            .unwrap();
        store
            .upsert(Collection::FuelEntries, "e1", "u1", &json!({"id": "e1", "liters": 6}))
            .await
            .unwrap();

        let docs = store.list(Collection::FuelEntries, "u1").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["liters"], 6);
        assert_eq!(
            store.owner_of(Collection::FuelEntries, "e1").await.unwrap(),
            Some("u1".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = setup().await;
        store
            .upsert(Collection::ServiceEntries, "s1", "u1", &json!({"id": "s1"}))
            .await
            .unwrap();

        assert!(store.delete(Collection::ServiceEntries, "s1").await.unwrap());
        assert!(!store.delete(Collection::ServiceEntries, "s1").await.unwrap());
        assert!(store
            .owner_of(Collection::ServiceEntries, "s1")
            .await
            .unwrap()
            .is_none());
    }
}
