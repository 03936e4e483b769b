//! Event dispatch.
//!
//! Events reach the worker over a bounded channel and are handled by a
//! single dispatcher task. Install, activate and page messages are awaited
//! inline, so events queued behind them wait. Fetch, sync, push and click
//! events each run in their own task.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::VersionReply;
use crate::error::{WorkerError, WorkerResult};
use crate::models::Request;
use crate::notify::ClickOutcome;
use crate::sync::DrainReport;
use crate::worker::{FetchOutcome, LifecycleState, Worker};

/// Events buffered before senders start waiting
pub const EVENT_CHANNEL_SIZE: usize = 32;

type Reply<T> = oneshot::Sender<T>;

pub enum WorkerEvent {
    Install {
        reply: Reply<WorkerResult<usize>>,
    },
    Activate {
        reply: Reply<WorkerResult<Vec<String>>>,
    },
    Fetch {
        request: Request,
        reply: Reply<WorkerResult<FetchOutcome>>,
    },
    Sync {
        tag: String,
        reply: Reply<Option<DrainReport>>,
    },
    Push {
        payload: Option<Vec<u8>>,
        reply: Reply<Option<u64>>,
    },
    NotificationClick {
        id: u64,
        action: Option<String>,
        reply: Reply<ClickOutcome>,
    },
    Message {
        data: Value,
        reply: Reply<WorkerResult<Option<VersionReply>>>,
    },
}

impl WorkerEvent {
    fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install { .. } => "install",
            WorkerEvent::Activate { .. } => "activate",
            WorkerEvent::Fetch { .. } => "fetch",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Message { .. } => "message",
        }
    }
}

/// Start the dispatcher task. It runs until every handle is dropped.
pub fn spawn(worker: Arc<Worker>) -> (WorkerHandle, JoinHandle<()>) {
    let (events, receiver) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let handle = WorkerHandle {
        events,
        state: worker.subscribe(),
    };
    let task = tokio::spawn(run(worker, receiver));
    (handle, task)
}

async fn run(worker: Arc<Worker>, mut events: mpsc::Receiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
        debug!(kind = event.kind(), "Dispatching event");
        dispatch(&worker, event).await;
    }
    debug!("Event channel closed, dispatcher stopping");
}

async fn dispatch(worker: &Arc<Worker>, event: WorkerEvent) {
    match event {
        WorkerEvent::Install { reply } => {
            let _ = reply.send(worker.install().await);
        }
        WorkerEvent::Activate { reply } => {
            let _ = reply.send(worker.activate().await);
        }
        WorkerEvent::Message { data, reply } => {
            let _ = reply.send(worker.handle_message(&data).await);
        }
        WorkerEvent::Fetch { request, reply } => {
            let worker = Arc::clone(worker);
            tokio::spawn(async move {
                let started = Instant::now();
                let url = request.url.clone();
                let result = worker.handle_fetch(request).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(FetchOutcome::Responded { strategy, response }) => {
                        info!(url = %url, strategy = %strategy, status = response.status, elapsed_ms, "Fetch served");
                    }
                    Ok(FetchOutcome::Bypass) => debug!(url = %url, elapsed_ms, "Fetch bypassed"),
                    Err(e) => warn!(url = %url, error = %e, elapsed_ms, "Fetch failed"),
                }
                let _ = reply.send(result);
            });
        }
        WorkerEvent::Sync { tag, reply } => {
            let worker = Arc::clone(worker);
            tokio::spawn(async move {
                let _ = reply.send(worker.handle_sync(&tag).await);
            });
        }
        WorkerEvent::Push { payload, reply } => {
            let worker = Arc::clone(worker);
            tokio::spawn(async move {
                let _ = reply.send(worker.handle_push(payload.as_deref()).await);
            });
        }
        WorkerEvent::NotificationClick { id, action, reply } => {
            let worker = Arc::clone(worker);
            tokio::spawn(async move {
                let _ = reply.send(worker.handle_click(id, action.as_deref()).await);
            });
        }
    }
}

/// Client side of the event loop. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    events: mpsc::Sender<WorkerEvent>,
    state: watch::Receiver<LifecycleState>,
}

impl WorkerHandle {
    async fn request<T>(&self, event: impl FnOnce(Reply<T>) -> WorkerEvent) -> WorkerResult<T> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(event(reply))
            .await
            .map_err(|_| WorkerError::Closed)?;
        response.await.map_err(|_| WorkerError::Closed)
    }

    pub async fn install(&self) -> WorkerResult<usize> {
        self.request(|reply| WorkerEvent::Install { reply }).await?
    }

    pub async fn activate(&self) -> WorkerResult<Vec<String>> {
        self.request(|reply| WorkerEvent::Activate { reply }).await?
    }

    pub async fn fetch(&self, request: Request) -> WorkerResult<FetchOutcome> {
        self.request(|reply| WorkerEvent::Fetch { request, reply }).await?
    }

    pub async fn sync(&self, tag: impl Into<String>) -> WorkerResult<Option<DrainReport>> {
        let tag = tag.into();
        self.request(|reply| WorkerEvent::Sync { tag, reply }).await
    }

    /// Returns the id of the displayed notification, if one was shown.
    pub async fn push(&self, payload: Option<Vec<u8>>) -> WorkerResult<Option<u64>> {
        self.request(|reply| WorkerEvent::Push { payload, reply }).await
    }

    pub async fn click(&self, id: u64, action: Option<String>) -> WorkerResult<ClickOutcome> {
        self.request(|reply| WorkerEvent::NotificationClick { id, action, reply })
            .await
    }

    pub async fn message(&self, data: Value) -> WorkerResult<Option<VersionReply>> {
        self.request(|reply| WorkerEvent::Message { data, reply }).await?
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Resolves once the worker has finished activating.
    pub async fn wait_until_activated(&self) -> WorkerResult<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == LifecycleState::Activated)
            .await
            .map_err(|_| WorkerError::Closed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::config::Config;
    use crate::models::Response;
    use crate::router::Strategy;
    use crate::sync::SyncQueue;
    use crate::testing::{HostCall, MockFetcher, MockReply, RecordingHost};
    use serde_json::json;
    use url::Url;

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080/").unwrap().join(path).unwrap()
    }

    fn start(config: Config) -> (WorkerHandle, JoinHandle<()>, Arc<RecordingHost>) {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_responder(|_: &Request| Some(MockReply::Respond(Response::ok("asset")))),
        );
        let host = Arc::new(RecordingHost::new());
        let sync = SyncQueue::in_memory(url("/api/exam-results"), fetcher.clone(), None);
        let worker = Worker::new(
            &config,
            Arc::new(MemoryBackend::new()),
            fetcher,
            host.clone(),
            sync,
        )
        .unwrap();
        let (handle, task) = spawn(Arc::new(worker));
        (handle, task, host)
    }

    #[tokio::test]
    async fn test_fetch_queued_behind_install_is_intercepted() {
        let (handle, _task, _) = start(Config::default());

        let (installed, fetched) =
            tokio::join!(handle.install(), handle.fetch(Request::get(url("/api/exams"))));

        assert_eq!(installed.unwrap(), 8);
        assert!(matches!(
            fetched.unwrap(),
            FetchOutcome::Responded { strategy: Strategy::NetworkFirst, .. }
        ));
    }

    #[tokio::test]
    async fn test_wait_until_activated() {
        let config = Config {
            skip_waiting_on_install: false,
            ..Config::default()
        };
        let (handle, _task, _) = start(config);
        handle.install().await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Installed);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_until_activated().await })
        };
        handle.activate().await.unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(handle.state(), LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_message_reply() {
        let (handle, _task, _) = start(Config::default());
        let reply = handle.message(json!({"type": "GET_VERSION"})).await.unwrap();
        assert_eq!(reply.unwrap().version, "exam-app-v1.0.0");
    }

    #[tokio::test]
    async fn test_push_then_click() {
        let (handle, _task, host) = start(Config::default());

        let id = handle.push(None).await.unwrap().unwrap();
        let outcome = handle.click(id, Some("explore".to_string())).await.unwrap();

        assert_eq!(outcome, ClickOutcome::Navigated(url("/?page=exams")));
        let calls = host.calls();
        assert!(matches!(calls[0], HostCall::Show { .. }));
        assert_eq!(calls[1], HostCall::Close(id));
    }

    #[tokio::test]
    async fn test_sync_event() {
        let (handle, _task, _) = start(Config::default());
        assert_eq!(handle.sync("exam-result-sync").await.unwrap(), Some(Default::default()));
        assert_eq!(handle.sync("something-else").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_loop_reports_closed() {
        let (handle, task, _) = start(Config::default());
        task.abort();
        let _ = task.await;

        let err = handle.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::Closed));
    }
}
