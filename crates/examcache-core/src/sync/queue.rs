use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::file::write_atomic;
use crate::error::CacheError;
use crate::models::Request;
use crate::network::{fetch_with_deadline, Fetcher, NetworkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Submitting,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSyncItem {
    pub id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub status: SyncStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Outcome of one drain cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Acknowledged and removed, in submission order
    pub submitted: Vec<String>,
    /// Back to pending for the next signal
    pub failed: Vec<String>,
    /// Items left in the queue afterwards
    pub remaining: usize,
}

/// Durable FIFO of submissions waiting for connectivity.
///
/// Items move `pending -> submitting -> (removed | failed -> pending)`.
/// There is no retry loop: a failed item waits for the next drain.
///
/// Each item is POSTed as JSON carrying its id: an object payload gets an
/// `"id"` field unless it already has one, anything else is wrapped as
/// `{"id": .., "payload": ..}`.
pub struct SyncQueue {
    items: Mutex<Vec<PendingSyncItem>>,
    /// Held for the whole of a drain so drains never overlap
    drain_lock: Mutex<()>,
    path: Option<PathBuf>,
    endpoint: Url,
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Option<Duration>,
}

impl SyncQueue {
    /// Queue without persistence
    pub fn in_memory(endpoint: Url, fetcher: Arc<dyn Fetcher>, fetch_timeout: Option<Duration>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            drain_lock: Mutex::new(()),
            path: None,
            endpoint,
            fetcher,
            fetch_timeout,
        }
    }

    /// Queue persisted at `path`. Items interrupted mid-submission by a
    /// previous run are reset to pending.
    pub async fn load(
        path: PathBuf,
        endpoint: Url,
        fetcher: Arc<dyn Fetcher>,
        fetch_timeout: Option<Duration>,
    ) -> Result<Self, CacheError> {
        let mut items: Vec<PendingSyncItem> = match tokio::fs::read(&path).await {
            Ok(contents) => serde_json::from_slice(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        for item in items.iter_mut().filter(|i| i.status != SyncStatus::Pending) {
            debug!(id = %item.id, status = ?item.status, "Resetting interrupted sync item");
            item.status = SyncStatus::Pending;
        }
        debug!(count = items.len(), path = %path.display(), "Sync queue loaded");

        Ok(Self {
            items: Mutex::new(items),
            drain_lock: Mutex::new(()),
            path: Some(path),
            endpoint,
            fetcher,
            fetch_timeout,
        })
    }

    /// Append a submission. Returns false if `id` is already queued.
    pub async fn enqueue(&self, id: impl Into<String>, payload: Value) -> Result<bool, CacheError> {
        let id = id.into();
        let mut items = self.items.lock().await;
        if items.iter().any(|i| i.id == id) {
            debug!(id = %id, "Submission already queued");
            return Ok(false);
        }

        items.push(PendingSyncItem {
            id: id.clone(),
            payload,
            created_at: Utc::now(),
            status: SyncStatus::Pending,
            attempts: 0,
            last_error: None,
        });
        if let Err(e) = self.save(&items).await {
            items.pop();
            return Err(e);
        }
        info!(id = %id, queued = items.len(), "Queued submission for sync");
        Ok(true)
    }

    /// Snapshot of the queue in insertion order
    pub async fn items(&self) -> Vec<PendingSyncItem> {
        self.items.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Submit every queued item, oldest first. A concurrent call waits for
    /// the running drain and then drains whatever is left.
    pub async fn drain(&self) -> DrainReport {
        let _drain = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        let ids: Vec<String> = self
            .items
            .lock()
            .await
            .iter()
            .filter(|i| i.status == SyncStatus::Pending)
            .map(|i| i.id.clone())
            .collect();

        for id in ids {
            let Some(payload) = self.begin_submit(&id).await else {
                continue;
            };

            let outcome = self.submit(&id, payload).await;

            let mut items = self.items.lock().await;
            match outcome {
                Ok(()) => {
                    items.retain(|i| i.id != id);
                    info!(id = %id, "Synced exam result");
                    report.submitted.push(id);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Failed to sync exam result");
                    if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                        item.status = SyncStatus::Failed;
                        item.last_error = Some(e.to_string());
                    }
                    report.failed.push(id);
                }
            }
            self.save_logged(&items).await;
        }

        let mut items = self.items.lock().await;
        for item in items.iter_mut().filter(|i| i.status == SyncStatus::Failed) {
            item.status = SyncStatus::Pending;
        }
        self.save_logged(&items).await;
        report.remaining = items.len();
        report
    }

    /// Mark an item as submitting and hand back its payload
    async fn begin_submit(&self, id: &str) -> Option<Value> {
        let mut items = self.items.lock().await;
        let item = items.iter_mut().find(|i| i.id == id)?;
        item.status = SyncStatus::Submitting;
        item.attempts += 1;
        let payload = item.payload.clone();
        self.save_logged(&items).await;
        Some(payload)
    }

    async fn submit(&self, id: &str, payload: Value) -> Result<(), NetworkError> {
        let body = submission_body(id, payload);
        let request = Request::post_json(self.endpoint.clone(), &body)
            .map_err(|e| NetworkError::Unreachable(format!("unencodable payload: {}", e)))?;
        let response = fetch_with_deadline(self.fetcher.as_ref(), &request, self.fetch_timeout).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(NetworkError::from_status(response.status, &response.text()))
        }
    }

    async fn save(&self, items: &[PendingSyncItem]) -> Result<(), CacheError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let contents = serde_json::to_vec_pretty(items)?;
        write_atomic(path, &contents).await
    }

    /// The in-memory queue stays authoritative when a save fails
    async fn save_logged(&self, items: &[PendingSyncItem]) {
        if let Err(e) = self.save(items).await {
            error!(error = %e, "Failed to persist sync queue");
        }
    }
}

fn submission_body(id: &str, payload: Value) -> Value {
    match payload {
        Value::Object(mut fields) => {
            fields
                .entry("id")
                .or_insert_with(|| Value::String(id.to_string()));
            Value::Object(fields)
        }
        other => json!({ "id": id, "payload": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Response;
    use crate::testing::{MockFetcher, MockReply};
    use std::sync::atomic::{AtomicBool, Ordering};

    const ENDPOINT: &str = "http://localhost:8080/api/exam-results";

    fn endpoint() -> Url {
        Url::parse(ENDPOINT).unwrap()
    }

    /// Accepts every submission except those whose id is in `rejected`
    fn peer(rejected: &'static [&'static str]) -> Arc<MockFetcher> {
        Arc::new(MockFetcher::new().with_responder(move |request| {
            let body: Value = serde_json::from_slice(request.body.as_deref()?).ok()?;
            let id = body.get("id")?.as_str()?;
            if rejected.iter().any(|r| *r == id) {
                Some(MockReply::Respond(Response::new(503, "unavailable")))
            } else {
                Some(MockReply::Respond(Response::new(201, "")))
            }
        }))
    }

    async fn queue_with(fetcher: Arc<MockFetcher>, ids: &[&str]) -> SyncQueue {
        let queue = SyncQueue::in_memory(endpoint(), fetcher, None);
        for id in ids {
            queue.enqueue(*id, json!({"id": id, "score": 10})).await.unwrap();
        }
        queue
    }

    fn submitted_ids(fetcher: &MockFetcher) -> Vec<String> {
        fetcher
            .requests()
            .iter()
            .filter_map(|r| {
                let body: Value = serde_json::from_slice(r.body.as_deref()?).ok()?;
                Some(body.get("id")?.as_str()?.to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_item_stays_pending() {
        let fetcher = peer(&["B"]);
        let queue = queue_with(fetcher.clone(), &["A", "B", "C"]).await;

        let report = queue.drain().await;
        assert_eq!(report.submitted, vec!["A", "C"]);
        assert_eq!(report.failed, vec!["B"]);
        assert_eq!(report.remaining, 1);

        let items = queue.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "B");
        assert_eq!(items[0].status, SyncStatus::Pending);
        assert_eq!(items[0].attempts, 1);
        assert!(items[0].last_error.as_deref().unwrap_or_default().contains("503"));
    }

    #[tokio::test]
    async fn test_second_drain_empties_queue() {
        // Rejects B the first time only
        let rejected_once = AtomicBool::new(false);
        let fetcher = Arc::new(MockFetcher::new().with_responder(move |request| {
            let body: Value = serde_json::from_slice(request.body.as_deref()?).ok()?;
            let id = body.get("id")?.as_str()?;
            if id == "B" && !rejected_once.swap(true, Ordering::SeqCst) {
                Some(MockReply::Respond(Response::new(503, "unavailable")))
            } else {
                Some(MockReply::Respond(Response::new(201, "")))
            }
        }));
        let queue = queue_with(fetcher.clone(), &["A", "B", "C"]).await;

        let first = queue.drain().await;
        assert_eq!(first.failed, vec!["B"]);
        assert_eq!(queue.len().await, 1);

        let second = queue.drain().await;
        assert_eq!(second.submitted, vec!["B"]);
        assert!(second.failed.is_empty());
        assert_eq!(second.remaining, 0);
        assert!(queue.is_empty().await);
        assert_eq!(submitted_ids(&fetcher), vec!["A", "B", "C", "B"]);
    }

    #[tokio::test]
    async fn test_submission_body_carries_id() {
        let fetcher = peer(&[]);
        let queue = SyncQueue::in_memory(endpoint(), fetcher.clone(), None);
        queue.enqueue("A", json!({"score": 7})).await.unwrap();
        queue.enqueue("B", json!({"id": "exam-b", "score": 9})).await.unwrap();
        queue.enqueue("C", json!([1, 2, 3])).await.unwrap();

        let report = queue.drain().await;
        assert_eq!(report.submitted, vec!["A", "B", "C"]);

        let bodies: Vec<Value> = fetcher
            .requests()
            .iter()
            .map(|r| serde_json::from_slice(r.body.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(bodies[0], json!({"id": "A", "score": 7}));
        assert_eq!(bodies[1], json!({"id": "exam-b", "score": 9}));
        assert_eq!(bodies[2], json!({"id": "C", "payload": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_drain_is_fifo() {
        let fetcher = peer(&[]);
        let queue = queue_with(fetcher.clone(), &["first", "second", "third"]).await;
        queue.drain().await;
        assert_eq!(submitted_ids(&fetcher), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_network_error_reverts_to_pending() {
        let fetcher = Arc::new(MockFetcher::new().fail(ENDPOINT));
        let queue = queue_with(fetcher, &["A"]).await;

        let report = queue.drain().await;
        assert_eq!(report.failed, vec!["A"]);
        assert_eq!(queue.items().await[0].status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_id_not_enqueued() {
        let queue = SyncQueue::in_memory(endpoint(), peer(&[]), None);
        assert!(queue.enqueue("A", json!({"id": "A"})).await.unwrap());
        assert!(!queue.enqueue("A", json!({"id": "A", "retry": true})).await.unwrap());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_drains_do_not_double_submit() {
        let fetcher = peer(&[]);
        let queue = Arc::new(queue_with(fetcher.clone(), &["A", "B", "C"]).await);

        let (a, b) = tokio::join!(queue.drain(), queue.drain());
        let mut all: Vec<String> = a.submitted.into_iter().chain(b.submitted).collect();
        all.sort();

        assert_eq!(all, vec!["A", "B", "C"]);
        assert_eq!(fetcher.total_calls(), 3);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_persisted_queue_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-queue.json");
        let fetcher = Arc::new(MockFetcher::new().fail(ENDPOINT));

        {
            let queue = SyncQueue::load(path.clone(), endpoint(), fetcher.clone(), None)
                .await
                .unwrap();
            queue.enqueue("A", json!({"id": "A"})).await.unwrap();
            queue.enqueue("B", json!({"id": "B"})).await.unwrap();
            queue.drain().await;
        }

        let reloaded = SyncQueue::load(path, endpoint(), fetcher, None).await.unwrap();
        let ids: Vec<String> = reloaded.items().await.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_interrupted_submission_reset_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-queue.json");
        let stuck = vec![PendingSyncItem {
            id: "A".to_string(),
            payload: json!({"id": "A"}),
            created_at: Utc::now(),
            status: SyncStatus::Submitting,
            attempts: 1,
            last_error: None,
        }];
        std::fs::write(&path, serde_json::to_vec(&stuck).unwrap()).unwrap();

        let queue = SyncQueue::load(path, endpoint(), peer(&[]), None).await.unwrap();
        assert_eq!(queue.items().await[0].status, SyncStatus::Pending);
    }
}
