use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use super::backend::{CacheBackend, CachedData, CachedResponse};
use crate::error::{CacheError, WorkerError, WorkerResult};
use crate::models::{CacheKey, Request, Response};
use crate::network::{fetch_with_deadline, Fetcher};

/// Which of the two versioned stores a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    /// Precache manifest, populated on install
    Static,
    /// Runtime entries written by the strategies
    Dynamic,
}

impl CacheRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheRole::Static => "static",
            CacheRole::Dynamic => "dynamic",
        }
    }
}

/// Store names for one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_store: String,
    pub dynamic_store: String,
}

impl CacheNames {
    pub fn for_version(version: &str) -> Self {
        Self {
            static_store: format!("{}-v{}", CacheRole::Static.prefix(), version),
            dynamic_store: format!("{}-v{}", CacheRole::Dynamic.prefix(), version),
        }
    }

    pub fn name(&self, role: CacheRole) -> &str {
        match role {
            CacheRole::Static => &self.static_store,
            CacheRole::Dynamic => &self.dynamic_store,
        }
    }

    /// The stores that survive activation cleanup
    pub fn allow_list(&self) -> Vec<String> {
        vec![self.static_store.clone(), self.dynamic_store.clone()]
    }
}

/// Handle to one named store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    name: String,
    backend: Arc<dyn CacheBackend>,
}

impl Store {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        self.put_all(vec![(key, response)]).await
    }

    /// Write every entry or none of them
    pub async fn put_all(&self, entries: Vec<(CacheKey, Response)>) -> Result<(), CacheError> {
        let entries = entries
            .into_iter()
            .map(|(key, response)| (key, CachedData::new(response)))
            .collect();
        self.backend.put_all(&self.name, entries).await
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(self.backend.get(&self.name, key).await?.map(|c| c.data))
    }

    pub async fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        self.backend.keys(&self.name).await
    }
}

/// Owns the versioned cache stores of one worker generation.
///
/// Stores are deleted only by [`CacheRegistry::purge`], which the worker
/// calls during activation.
pub struct CacheRegistry {
    backend: Arc<dyn CacheBackend>,
    names: CacheNames,
}

impl CacheRegistry {
    pub fn new(backend: Arc<dyn CacheBackend>, names: CacheNames) -> Self {
        Self { backend, names }
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    /// Handle to the current store for `role`, without creating it.
    /// The store is created lazily by its first write.
    pub fn store(&self, role: CacheRole) -> Store {
        Store {
            name: self.names.name(role).to_string(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Create the store for `role` if needed. Opening twice yields the same store.
    pub async fn open(&self, role: CacheRole) -> Result<Store, CacheError> {
        let store = self.store(role);
        if self.backend.open(store.name()).await? {
            debug!(store = store.name(), "Opened new store");
        }
        Ok(store)
    }

    pub async fn put(
        &self,
        role: CacheRole,
        key: CacheKey,
        response: Response,
    ) -> Result<(), CacheError> {
        self.store(role).put(key, response).await
    }

    /// Look `key` up in every store, oldest store first. A store that
    /// cannot be read is skipped.
    pub async fn match_any(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        for name in self.backend.stores().await? {
            match self.backend.get(&name, key).await {
                Ok(Some(cached)) => return Ok(Some(cached.data)),
                Ok(None) => {}
                Err(e) => warn!(store = %name, error = %e, "Skipping unreadable store"),
            }
        }
        Ok(None)
    }

    /// Look `key` up in the current store for `role` only.
    pub async fn match_in(
        &self,
        role: CacheRole,
        key: &CacheKey,
    ) -> Result<Option<Response>, CacheError> {
        self.store(role).get(key).await
    }

    /// Delete every store whose name is not in `allow_list`.
    /// Returns the names of the deleted stores.
    pub async fn purge(&self, allow_list: &[String]) -> Result<Vec<String>, CacheError> {
        let mut deleted = Vec::new();
        for name in self.backend.stores().await? {
            if allow_list.iter().any(|allowed| *allowed == name) {
                continue;
            }
            info!(store = %name, "Deleting old cache");
            if self.backend.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Fetch every manifest URL and write them into the static store as one
    /// batch. Any failed fetch or non-2xx response aborts the whole batch
    /// and nothing is written, not even an empty store. Returns the number
    /// of entries written.
    pub async fn precache(
        &self,
        manifest: &[Url],
        fetcher: &dyn Fetcher,
        timeout: Option<Duration>,
    ) -> WorkerResult<usize> {
        let store = self.store(CacheRole::Static);

        let mut unique: Vec<&Url> = Vec::with_capacity(manifest.len());
        for url in manifest {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }

        let fetches = unique.into_iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = fetch_with_deadline(fetcher, &request, timeout)
                .await
                .map_err(|e| WorkerError::Precache {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            if !response.is_ok() {
                return Err(WorkerError::Precache {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((request.cache_key(), response))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        store.put_all(entries).await?;
        info!(store = store.name(), count, "Static assets cached");
        Ok(count)
    }

    pub async fn stores(&self) -> Result<Vec<String>, CacheError> {
        self.backend.stores().await
    }

    pub async fn entry_count(&self, store: &str) -> Result<usize, CacheError> {
        Ok(self.backend.keys(store).await?.len())
    }

    /// Every entry of a store, sorted by key
    pub async fn entries(&self, store: &str) -> Result<Vec<(CacheKey, CachedResponse)>, CacheError> {
        let mut entries = Vec::new();
        for key in self.backend.keys(store).await? {
            if let Some(cached) = self.backend.get(store, &key).await? {
                entries.push((key, cached));
            }
        }
        Ok(entries)
    }
}
