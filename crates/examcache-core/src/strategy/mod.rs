//! Strategy executors.
//!
//! Each strategy is a method on [`Executor`]; see the submodules for the
//! individual read/write contracts. All three share the same rules:
//! - only 2xx responses are written, and only into the dynamic store
//! - cache reads search every store
//! - a cache read or write failure is logged and never fails the request

mod cache_first;
mod network_first;
mod stale_while_revalidate;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheRegistry, CacheRole};
use crate::error::WorkerResult;
use crate::models::{CacheKey, Request, Response};
use crate::network::{fetch_with_deadline, Fetcher, NetworkError};
use crate::router::Strategy;

type Revalidation = JoinHandle<Result<Response, NetworkError>>;

pub struct Executor {
    registry: Arc<CacheRegistry>,
    fetcher: Arc<dyn Fetcher>,
    offline_url: Url,
    fetch_timeout: Option<Duration>,
    /// Background refreshes started by stale-while-revalidate
    revalidations: Mutex<Vec<Revalidation>>,
}

impl Executor {
    pub fn new(
        registry: Arc<CacheRegistry>,
        fetcher: Arc<dyn Fetcher>,
        offline_url: Url,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            offline_url,
            fetch_timeout,
            revalidations: Mutex::new(Vec::new()),
        }
    }

    pub async fn execute(&self, strategy: Strategy, request: &Request) -> WorkerResult<Response> {
        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Wait for every background refresh started so far.
    pub async fn settle(&self) {
        let pending = std::mem::take(&mut *self.revalidations.lock().await);
        join_all(pending).await;
    }

    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        fetch_with_deadline(self.fetcher.as_ref(), request, self.fetch_timeout).await
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<Response> {
        match self.registry.match_any(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn offline_fallback(&self) -> Option<Response> {
        let response = self.cache_lookup(&CacheKey::for_url(&self.offline_url)).await;
        if response.is_none() {
            warn!(url = %self.offline_url, "Offline fallback document is not cached");
        }
        response
    }

    async fn store_dynamic(&self, key: CacheKey, response: Response) {
        write_dynamic(&self.registry, key, response).await;
    }

    async fn track(&self, handle: Revalidation) {
        let mut revalidations = self.revalidations.lock().await;
        revalidations.retain(|h| !h.is_finished());
        revalidations.push(handle);
    }
}

/// Write into the dynamic store, logging instead of failing.
async fn write_dynamic(registry: &CacheRegistry, key: CacheKey, response: Response) {
    match registry.put(CacheRole::Dynamic, key.clone(), response).await {
        Ok(()) => debug!(key = %key, "Cached response"),
        Err(e) => warn!(key = %key, error = %e, "Failed to write cache entry"),
    }
}
