//! Network access for the coordinator.
//!
//! Executors and the sync queue talk to the network only through the
//! [`Fetcher`] trait. [`HttpFetcher`] is the real implementation; tests
//! substitute a scripted fake.

pub mod client;
pub mod error;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Request, Response};

pub use client::HttpFetcher;
pub use error::NetworkError;

/// A network peer that turns a request into a fully buffered response.
///
/// Non-2xx statuses are returned as `Ok`; only transport-level failures are
/// errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Fetch with an optional upper bound on the wait. Expiry is reported as
/// [`NetworkError::Timeout`] so callers treat it like any other failure.
pub async fn fetch_with_deadline(
    fetcher: &dyn Fetcher,
    request: &Request,
    timeout: Option<Duration>,
) -> Result<Response, NetworkError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(request))
            .await
            .map_err(|_| NetworkError::Timeout(limit))?,
        None => fetcher.fetch(request).await,
    }
}
