//! Test doubles for the network and the notification host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::models::{Request, Response};
use crate::network::{Fetcher, NetworkError};
use crate::notify::{NotificationHost, NotificationSpec};

#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(Response),
    Fail,
}

type Responder = Box<dyn Fn(&Request) -> Option<MockReply> + Send + Sync>;

/// Scripted network peer. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, MockReply>>,
    responder: Mutex<Option<Responder>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<Request>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, response: Response) -> Self {
        self.set_response(url, response);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.set_failure(url);
        self
    }

    /// Consulted before the URL table; `None` falls through to it.
    pub fn with_responder(
        self,
        responder: impl Fn(&Request) -> Option<MockReply> + Send + Sync + 'static,
    ) -> Self {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
        self
    }

    pub fn set_response(&self, url: &str, response: Response) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), MockReply::Respond(response));
    }

    pub fn set_failure(&self, url: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), MockReply::Fail);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.as_str().to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_insert(0) += 1;
        self.requests.lock().unwrap().push(request.clone());

        let scripted = self
            .responder
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|responder| responder(request));
        let reply = scripted.or_else(|| self.replies.lock().unwrap().get(&url).cloned());

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail) | None => {
                Err(NetworkError::Unreachable(format!("no route to {}", url)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Show { id: u64, title: String },
    Close(u64),
    OpenWindow(String),
}

/// Notification host that records every call in order.
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    fail_show: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_show() -> Self {
        let host = Self::default();
        host.fail_show.store(true, Ordering::SeqCst);
        host
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationHost for RecordingHost {
    async fn show(&self, id: u64, spec: &NotificationSpec) -> anyhow::Result<()> {
        if self.fail_show.load(Ordering::SeqCst) {
            anyhow::bail!("notification permission denied");
        }
        self.calls.lock().unwrap().push(HostCall::Show {
            id,
            title: spec.title.clone(),
        });
        Ok(())
    }

    async fn close(&self, id: u64) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(HostCall::Close(id));
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(HostCall::OpenWindow(url.to_string()));
        Ok(())
    }
}
