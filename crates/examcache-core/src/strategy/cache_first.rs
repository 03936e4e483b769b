use tracing::warn;

use super::Executor;
use crate::error::{WorkerError, WorkerResult};
use crate::models::{Request, Response};

impl Executor {
    /// Cache-first, for immutable and versioned assets. A hit never touches
    /// the network; a cold miss that also fails on the network has no
    /// further fallback.
    pub(super) async fn cache_first(&self, request: &Request) -> WorkerResult<Response> {
        let key = request.cache_key();
        if let Some(cached) = self.cache_lookup(&key).await {
            return Ok(cached);
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_dynamic(key, response.clone()).await;
                }
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache first failed");
                Err(WorkerError::NoFallback {
                    url: request.url.to_string(),
                    source: e,
                })
            }
        }
    }
}
