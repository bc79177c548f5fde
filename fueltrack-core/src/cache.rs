//! Local key-value persistence for guest mode.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store the record store writes to while nobody is signed in.
///
/// Values are JSON text, one key per collection.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Process-local cache. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_set_get_remove() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("vehicles").await.unwrap(), None);

        cache.set("vehicles", "[]").await.unwrap();
        assert_eq!(cache.get("vehicles").await.unwrap().as_deref(), Some("[]"));

        cache.set("vehicles", "[1]").await.unwrap();
        assert_eq!(cache.get("vehicles").await.unwrap().as_deref(), Some("[1]"));

        cache.remove("vehicles").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_memory_cache_clear() {
        let cache = MemoryCache::new();
        cache.set("entries", "[]").await.unwrap();
        cache.set("serviceEntries", "[]").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
    }
}
