//! Terminal notification host.

use async_trait::async_trait;
use examcache_core::notify::{NotificationHost, NotificationSpec};
use tracing::info;
use url::Url;

/// Prints notifications and window requests to stdout.
pub struct ConsoleHost;

#[async_trait]
impl NotificationHost for ConsoleHost {
    async fn show(&self, id: u64, spec: &NotificationSpec) -> anyhow::Result<()> {
        info!(id, title = %spec.title, "Showing notification");
        println!("[notification {}] {}", id, spec.title);
        println!("  {}", spec.body);
        for action in &spec.actions {
            println!("  ({}) {}", action.action, action.title);
        }
        Ok(())
    }

    async fn close(&self, id: u64) -> anyhow::Result<()> {
        info!(id, "Closing notification");
        println!("[notification {}] closed", id);
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> anyhow::Result<()> {
        info!(url = %url, "Opening window");
        println!("Open {}", url);
        Ok(())
    }
}
