//! The coordinator: lifecycle state plus one handler per event kind.
//!
//! A worker moves `Parsed -> Installing -> Installed -> Activating ->
//! Activated`. A failed install leaves it `Redundant` until the next
//! install attempt. Requests are only intercepted once it is `Activated`.
//!
//! With a state file, the last settled state (`Installed` or `Activated`)
//! is recorded so a later process can resume it with [`Worker::restore`].

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::file::write_atomic;
use crate::cache::{CacheBackend, CacheRegistry, CacheRole};
use crate::config::Config;
use crate::control::{exam_data_path, ControlMessage, VersionReply};
use crate::error::{CacheError, WorkerError, WorkerResult};
use crate::models::{CacheKey, Request, Response};
use crate::network::Fetcher;
use crate::notify::{ClickOutcome, NotificationDispatcher, NotificationHost};
use crate::router::{Route, Router, Strategy};
use crate::strategy::Executor;
use crate::sync::{DrainReport, SyncQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LifecycleRecord {
    version: String,
    state: LifecycleState,
    updated_at: DateTime<Utc>,
}

/// Result of a fetch event
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller goes to the network itself
    Bypass,
    Responded { strategy: Strategy, response: Response },
}

pub struct Worker {
    generation_id: String,
    origin: Url,
    sync_tag: String,
    precache: Vec<Url>,
    fetch_timeout: Option<Duration>,
    registry: Arc<CacheRegistry>,
    router: Router,
    executor: Executor,
    sync: Arc<SyncQueue>,
    notifications: NotificationDispatcher,
    fetcher: Arc<dyn Fetcher>,
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
    /// Held across install and activate so transitions never interleave
    transition: Mutex<()>,
    state_file: Option<PathBuf>,
}

impl Worker {
    pub fn new(
        config: &Config,
        backend: Arc<dyn CacheBackend>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn NotificationHost>,
        sync: SyncQueue,
    ) -> WorkerResult<Self> {
        let registry = Arc::new(CacheRegistry::new(backend, config.cache_names()));
        let executor = Executor::new(
            Arc::clone(&registry),
            Arc::clone(&fetcher),
            config.resolve(&config.offline_fallback)?,
            config.fetch_timeout(),
        );
        let notifications = NotificationDispatcher::new(
            host,
            config.notification.clone(),
            config.resolve(&config.notification.explore_route)?,
        );
        let (state, _) = watch::channel(LifecycleState::Parsed);

        Ok(Self {
            generation_id: config.generation_id(),
            origin: config.origin_url()?,
            sync_tag: config.sync_tag.clone(),
            precache: config.precache_urls()?,
            fetch_timeout: config.fetch_timeout(),
            registry,
            router: Router::new(config.network_first.clone(), config.cache_first.clone()),
            executor,
            sync: Arc::new(sync),
            notifications,
            fetcher,
            state,
            skip_waiting: AtomicBool::new(config.skip_waiting_on_install),
            transition: Mutex::new(()),
            state_file: None,
        })
    }

    /// Record settled lifecycle states at `path`.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn generation_id(&self) -> &str {
        &self.generation_id
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn sync_queue(&self) -> &Arc<SyncQueue> {
        &self.sync
    }

    fn set_state(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Lifecycle transition");
        }
    }

    /// Pick up where a previous process left off. The recorded state is
    /// only trusted if it belongs to this version and the static store
    /// actually holds the precached assets.
    pub async fn restore(&self) -> WorkerResult<LifecycleState> {
        let _transition = self.transition.lock().await;
        let Some(record) = self.load_record().await? else {
            return Ok(self.state());
        };
        if record.version != self.generation_id {
            debug!(recorded = %record.version, "Lifecycle record belongs to another version");
            return Ok(self.state());
        }
        if !matches!(record.state, LifecycleState::Installed | LifecycleState::Activated) {
            return Ok(self.state());
        }

        let static_store = self.registry.names().name(CacheRole::Static);
        let cached = self
            .registry
            .entry_count(static_store)
            .await
            .unwrap_or_else(|e| {
                warn!(store = static_store, error = %e, "Static cache is unreadable");
                0
            });
        if cached == 0 {
            warn!(store = static_store, "Recorded as {} but the static cache is empty", record.state);
            return Ok(self.state());
        }
        self.set_state(record.state);
        Ok(self.state())
    }

    async fn load_record(&self) -> WorkerResult<Option<LifecycleRecord>> {
        let Some(ref path) = self.state_file else {
            return Ok(None);
        };
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e).into()),
        };
        match serde_json::from_slice(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable lifecycle record");
                Ok(None)
            }
        }
    }

    /// Failing to record is logged; the in-process state stays authoritative
    async fn persist(&self, state: LifecycleState) {
        let Some(ref path) = self.state_file else {
            return;
        };
        let record = LifecycleRecord {
            version: self.generation_id.clone(),
            state,
            updated_at: Utc::now(),
        };
        let result = match serde_json::to_vec_pretty(&record) {
            Ok(contents) => write_atomic(path, &contents).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to record lifecycle state");
        }
    }

    /// Precache the manifest. On success the worker is `Installed`, or
    /// `Activated` when skip-waiting is set. Returns the number of entries
    /// written.
    pub async fn install(&self) -> WorkerResult<usize> {
        let _transition = self.transition.lock().await;
        let previous = self.state();
        self.set_state(LifecycleState::Installing);
        info!(version = %self.generation_id, "Installing");

        let count = match self
            .registry
            .precache(&self.precache, self.fetcher.as_ref(), self.fetch_timeout)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Install failed");
                // An already active version keeps serving
                let fallback = if previous == LifecycleState::Activated {
                    LifecycleState::Activated
                } else {
                    LifecycleState::Redundant
                };
                self.set_state(fallback);
                return Err(e);
            }
        };
        self.set_state(LifecycleState::Installed);
        self.persist(LifecycleState::Installed).await;

        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate_locked().await?;
        }
        Ok(count)
    }

    /// Delete stale stores and start intercepting requests.
    /// Returns the names of the deleted stores.
    pub async fn activate(&self) -> WorkerResult<Vec<String>> {
        let _transition = self.transition.lock().await;
        self.activate_locked().await
    }

    async fn activate_locked(&self) -> WorkerResult<Vec<String>> {
        let previous = self.state();
        if !matches!(previous, LifecycleState::Installed | LifecycleState::Activated) {
            return Err(WorkerError::InvalidState {
                state: previous,
                action: "activate",
            });
        }

        self.set_state(LifecycleState::Activating);
        let deleted = match self.registry.purge(&self.registry.names().allow_list()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(previous);
                return Err(e.into());
            }
        };
        self.set_state(LifecycleState::Activated);
        self.persist(LifecycleState::Activated).await;
        info!(version = %self.generation_id, purged = deleted.len(), "Activated");
        Ok(deleted)
    }

    /// Activate as soon as possible: now if installed, otherwise right
    /// after the next successful install.
    pub async fn skip_waiting(&self) -> WorkerResult<()> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        let _transition = self.transition.lock().await;
        if self.state() == LifecycleState::Installed {
            self.activate_locked().await?;
        }
        Ok(())
    }

    pub async fn handle_fetch(&self, request: Request) -> WorkerResult<FetchOutcome> {
        if self.state() != LifecycleState::Activated {
            debug!(url = %request.url, state = %self.state(), "Not active, passing through");
            return Ok(FetchOutcome::Bypass);
        }
        match self.router.route(&request) {
            Route::Bypass => Ok(FetchOutcome::Bypass),
            Route::Handle(strategy) => {
                let response = self.executor.execute(strategy, &request).await?;
                Ok(FetchOutcome::Responded { strategy, response })
            }
        }
    }

    /// Queue an exam submission for the next sync.
    pub async fn enqueue(&self, id: impl Into<String>, payload: Value) -> WorkerResult<bool> {
        Ok(self.sync.enqueue(id, payload).await?)
    }

    /// Drain the sync queue if `tag` is ours; other tags are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Option<DrainReport> {
        if tag != self.sync_tag {
            debug!(tag, "Ignoring unknown sync tag");
            return None;
        }
        Some(self.sync.drain().await)
    }

    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Option<u64> {
        self.notifications.on_push(payload).await
    }

    pub async fn handle_click(&self, id: u64, action: Option<&str>) -> ClickOutcome {
        self.notifications.on_click(id, action).await
    }

    /// Handle a page message. Only a version query produces a reply.
    pub async fn handle_message(&self, raw: &Value) -> WorkerResult<Option<VersionReply>> {
        let Some(message) = ControlMessage::parse(raw) else {
            return Ok(None);
        };
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting().await?;
                Ok(None)
            }
            ControlMessage::GetVersion => Ok(Some(VersionReply {
                version: self.generation_id.clone(),
            })),
            ControlMessage::CacheExamData { exam_data } => {
                self.cache_exam_data(&exam_data).await;
                Ok(None)
            }
        }
    }

    async fn cache_exam_data(&self, record: &Value) {
        let Some(path) = exam_data_path(record) else {
            warn!("Exam data has no usable id, not caching");
            return;
        };
        let url = match self.origin.join(&path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path = %path, error = %e, "Invalid exam data path");
                return;
            }
        };
        let response = match Response::json(record) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to encode exam data");
                return;
            }
        };

        match self
            .registry
            .put(CacheRole::Dynamic, CacheKey::for_url(&url), response)
            .await
        {
            Ok(()) => debug!(url = %url, "Cached exam data"),
            Err(e) => warn!(url = %url, error = %e, "Failed to cache exam data"),
        }
    }
}
