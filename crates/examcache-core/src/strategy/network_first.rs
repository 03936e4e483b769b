use tracing::debug;

use super::Executor;
use crate::error::{WorkerError, WorkerResult};
use crate::models::{Request, Response};

impl Executor {
    /// Network-first, for volatile and API resources.
    ///
    /// The network answer always wins when there is one; the cache is only
    /// consulted after a failed fetch, then the offline document for
    /// navigations.
    pub(super) async fn network_first(&self, request: &Request) -> WorkerResult<Response> {
        let key = request.cache_key();

        let error = match self.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_dynamic(key, response.clone()).await;
                }
                return Ok(response);
            }
            Err(e) => e,
        };

        debug!(url = %request.url, error = %error, "Network failed, trying cache");
        if let Some(cached) = self.cache_lookup(&key).await {
            return Ok(cached);
        }

        if request.is_navigation() {
            if let Some(offline) = self.offline_fallback().await {
                return Ok(offline);
            }
        }

        Err(WorkerError::NoFallback {
            url: request.url.to_string(),
            source: error,
        })
    }
}
