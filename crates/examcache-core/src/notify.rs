//! Push notifications.
//!
//! A push always shows the same configured notification; the payload is
//! not interpreted. Clicks close the notification before any navigation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NotificationConfig;

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

/// Everything the host needs to display one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// The surface that actually displays notifications and windows.
#[async_trait]
pub trait NotificationHost: Send + Sync {
    async fn show(&self, id: u64, spec: &NotificationSpec) -> anyhow::Result<()>;

    async fn close(&self, id: u64) -> anyhow::Result<()>;

    /// Open a client window at `url`, or focus one already there
    async fn open_window(&self, url: &Url) -> anyhow::Result<()>;
}

/// What a click ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Navigated(Url),
    Dismissed,
}

pub struct NotificationDispatcher {
    host: Arc<dyn NotificationHost>,
    config: NotificationConfig,
    explore_url: Url,
    next_id: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new(host: Arc<dyn NotificationHost>, config: NotificationConfig, explore_url: Url) -> Self {
        Self {
            host,
            config,
            explore_url,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn build_spec(&self) -> NotificationSpec {
        NotificationSpec {
            title: self.config.title.clone(),
            body: self.config.body.clone(),
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: Utc::now().timestamp_millis(),
                primary_key: 1,
            },
            actions: self.config.actions.clone(),
        }
    }

    /// Show the notification for an inbound push. Fire-and-forget: a
    /// display failure is logged and `None` is returned.
    pub async fn on_push(&self, payload: Option<&[u8]>) -> Option<u64> {
        debug!(bytes = payload.map(<[u8]>::len), "Push received");
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let spec = self.build_spec();
        match self.host.show(id, &spec).await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(error = %e, "Failed to show notification");
                None
            }
        }
    }

    pub async fn on_click(&self, id: u64, action: Option<&str>) -> ClickOutcome {
        info!(id, action = ?action, "Notification click");

        if let Err(e) = self.host.close(id).await {
            warn!(id, error = %e, "Failed to close notification");
        }

        if action != Some(ACTION_EXPLORE) {
            return ClickOutcome::Dismissed;
        }
        if let Err(e) = self.host.open_window(&self.explore_url).await {
            warn!(url = %self.explore_url, error = %e, "Failed to open window");
        }
        ClickOutcome::Navigated(self.explore_url.clone())
    }
}
