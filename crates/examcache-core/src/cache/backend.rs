use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::models::{CacheKey, Response};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// Time since the entry was stored. A timestamp in the future counts as zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.cached_at).max(Duration::zero())
    }

    /// Largest whole unit of the age, for status listings
    pub fn age_display(&self) -> String {
        let age = self.age();
        match (age.num_days(), age.num_hours(), age.num_minutes()) {
            (0, 0, 0) => "just now".to_string(),
            (0, 0, minutes) => format!("{}m ago", minutes),
            (0, hours, _) => format!("{}h ago", hours),
            (days, _, _) => format!("{}d ago", days),
        }
    }
}

pub type CachedResponse = CachedData<Response>;

/// Storage for named cache stores.
///
/// Implementations must make `put_all` atomic: either every entry in the
/// batch becomes visible or none does.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Create the store if it does not exist. Returns true if it was created.
    async fn open(&self, store: &str) -> Result<bool, CacheError>;

    async fn has(&self, store: &str) -> Result<bool, CacheError>;

    /// Store names in creation order
    async fn stores(&self) -> Result<Vec<String>, CacheError>;

    /// Returns true if the store existed.
    async fn delete(&self, store: &str) -> Result<bool, CacheError>;

    /// Write a batch of entries, creating the store if needed.
    /// Existing entries with the same key are replaced.
    async fn put_all(
        &self,
        store: &str,
        entries: Vec<(CacheKey, CachedResponse)>,
    ) -> Result<(), CacheError>;

    async fn get(&self, store: &str, key: &CacheKey)
        -> Result<Option<CachedResponse>, CacheError>;

    /// Keys of a store, sorted. Empty if the store does not exist.
    async fn keys(&self, store: &str) -> Result<Vec<CacheKey>, CacheError>;
}

struct MemoryStore {
    name: String,
    entries: HashMap<CacheKey, CachedResponse>,
}

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    stores: RwLock<Vec<MemoryStore>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn open(&self, store: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().await;
        if stores.iter().any(|s| s.name == store) {
            return Ok(false);
        }
        stores.push(MemoryStore {
            name: store.to_string(),
            entries: HashMap::new(),
        });
        Ok(true)
    }

    async fn has(&self, store: &str) -> Result<bool, CacheError> {
        Ok(self.stores.read().await.iter().any(|s| s.name == store))
    }

    async fn stores(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    async fn delete(&self, store: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|s| s.name != store);
        Ok(stores.len() != before)
    }

    async fn put_all(
        &self,
        store: &str,
        entries: Vec<(CacheKey, CachedResponse)>,
    ) -> Result<(), CacheError> {
        let mut stores = self.stores.write().await;
        let index = match stores.iter().position(|s| s.name == store) {
            Some(index) => index,
            None => {
                stores.push(MemoryStore {
                    name: store.to_string(),
                    entries: HashMap::new(),
                });
                stores.len() - 1
            }
        };
        stores[index].entries.extend(entries);
        Ok(())
    }

    async fn get(
        &self,
        store: &str,
        key: &CacheKey,
    ) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|s| s.name == store)
            .and_then(|s| s.entries.get(key).cloned()))
    }

    async fn keys(&self, store: &str) -> Result<Vec<CacheKey>, CacheError> {
        let stores = self.stores.read().await;
        let mut keys: Vec<CacheKey> = stores
            .iter()
            .find(|s| s.name == store)
            .map(|s| s.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
