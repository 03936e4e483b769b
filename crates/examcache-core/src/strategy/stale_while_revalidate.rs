use std::sync::Arc;

use tracing::debug;

use super::{write_dynamic, Executor};
use crate::error::{WorkerError, WorkerResult};
use crate::models::{Request, Response};
use crate::network::{fetch_with_deadline, NetworkError};

impl Executor {
    /// Stale-while-revalidate, the default strategy.
    ///
    /// The network fetch starts before the cache lookup and runs in its own
    /// task. A cache hit is returned at once and the task refreshes the
    /// dynamic store in the background; a miss waits for the network, then
    /// falls back to the offline document.
    pub(super) async fn stale_while_revalidate(&self, request: &Request) -> WorkerResult<Response> {
        let key = request.cache_key();

        let registry = Arc::clone(&self.registry);
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.fetch_timeout;
        let background = request.clone();
        let network = tokio::spawn(async move {
            let result = fetch_with_deadline(fetcher.as_ref(), &background, timeout).await;
            match &result {
                Ok(response) if response.is_ok() => {
                    write_dynamic(&registry, background.cache_key(), response.clone()).await;
                }
                Ok(response) => {
                    debug!(url = %background.url, status = response.status, "Not caching error response");
                }
                Err(e) => debug!(url = %background.url, error = %e, "Network failed"),
            }
            result
        });

        if let Some(cached) = self.cache_lookup(&key).await {
            // The refresh outlives this request; its outcome is never surfaced
            self.track(network).await;
            return Ok(cached);
        }

        let error = match network.await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e,
            Err(e) => NetworkError::Unreachable(format!("fetch task aborted: {}", e)),
        };

        if let Some(offline) = self.offline_fallback().await {
            return Ok(offline);
        }
        Err(WorkerError::NoFallback {
            url: request.url.to_string(),
            source: error,
        })
    }
}
