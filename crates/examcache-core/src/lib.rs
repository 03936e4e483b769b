//! Offline request interception and caching for the exam web app.
//!
//! A [`Worker`] sits between the app and the network. Every intercepted GET
//! is classified by the [`Router`] and served by one of three strategies
//! against versioned cache stores. Exam submissions made while offline wait
//! in the [`SyncQueue`] until connectivity returns, pushes become
//! notifications, and the page talks to the worker over a small message
//! channel.
//!
//! Events are delivered through [`event::spawn`], which returns a
//! [`WorkerHandle`].

pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod models;
pub mod network;
pub mod notify;
pub mod router;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{CacheBackend, CacheRegistry, FileBackend, MemoryBackend};
pub use config::{Config, NotificationConfig};
pub use control::{ControlMessage, VersionReply};
pub use error::{CacheError, WorkerError, WorkerResult};
pub use event::{WorkerEvent, WorkerHandle};
pub use models::{CacheKey, Destination, Request, Response};
pub use network::{Fetcher, HttpFetcher, NetworkError};
pub use notify::{ClickOutcome, NotificationHost, NotificationSpec};
pub use router::{Router, Strategy};
pub use sync::{DrainReport, SyncQueue};
pub use worker::{FetchOutcome, LifecycleState, Worker};
