//! examcache - drive the offline coordinator from the command line.
//!
//! Each invocation restores the worker from the on-disk cache, delivers one
//! event, and waits for any background cache refresh before exiting.
//!
//! Cache directory layout:
//!
//! ```text
//! <cache_dir>/stores/<store>.json   one file per cache store
//! <cache_dir>/sync-queue.json       queued exam submissions
//! <cache_dir>/worker-state.json     last settled lifecycle state
//! ```

mod host;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use examcache_core::cache::CacheRole;
use examcache_core::event::{self, WorkerHandle};
use examcache_core::{
    Config, FetchOutcome, Fetcher, FileBackend, HttpFetcher, Request, SyncQueue, Worker,
};
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host::ConsoleHost;

// ============================================================================
// Constants
// ============================================================================

/// Store files live in their own subdirectory of the cache directory
const STORES_DIR: &str = "stores";

const SYNC_QUEUE_FILE: &str = "sync-queue.json";

const WORKER_STATE_FILE: &str = "worker-state.json";

/// Log file prefix when `--log-dir` is given
const LOG_FILE_PREFIX: &str = "examcache.log";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "examcache", version, about = "Offline cache coordinator for the exam app")]
struct Cli {
    /// Config file (defaults to ~/.config/examcache/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Precache the app shell for the configured version
    Install,
    /// Activate the installed version and delete old caches
    Activate,
    /// Serve a request through the coordinator
    Fetch {
        /// Absolute URL or path relative to the origin
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        document: bool,
        /// Print the response body
        #[arg(long)]
        body: bool,
    },
    /// Queue an exam result for the next sync
    Enqueue {
        id: String,
        /// JSON payload
        payload: String,
    },
    /// Deliver a background sync signal
    Sync {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Deliver a push, optionally clicking the resulting notification
    Push {
        /// Action to click (`explore` or `close`)
        #[arg(long)]
        click: Option<String>,
    },
    /// Deliver a notification click
    Click {
        id: u64,
        #[arg(long)]
        action: Option<String>,
    },
    /// Post a JSON message to the worker
    Message { json: String },
    /// Show lifecycle state, stores and queued submissions
    Status {
        /// List every cached URL with its age
        #[arg(long)]
        entries: bool,
    },
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g., RUST_LOG=examcache_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            Ok(config)
        }
        None => Config::load(),
    }
}

async fn build_worker(config: &Config) -> Result<Arc<Worker>> {
    let cache_dir = config.cache_dir()?;
    let stores_dir = cache_dir.join(STORES_DIR);
    let backend = FileBackend::new(stores_dir.clone())
        .await
        .with_context(|| format!("Failed to open cache directory {}", stores_dir.display()))?;
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::new().context("Failed to create HTTP client")?);

    let sync = SyncQueue::load(
        cache_dir.join(SYNC_QUEUE_FILE),
        config.resolve(&config.sync_endpoint)?,
        Arc::clone(&fetcher),
        config.fetch_timeout(),
    )
    .await
    .context("Failed to load sync queue")?;

    let worker = Worker::new(config, Arc::new(backend), fetcher, Arc::new(ConsoleHost), sync)?
        .with_state_file(cache_dir.join(WORKER_STATE_FILE));
    let state = worker.restore().await.context("Failed to read cache state")?;
    debug!(state = %state, dir = %cache_dir.display(), "Worker restored");
    Ok(Arc::new(worker))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    let config = load_config(cli.config.as_deref())?;
    info!(version = %config.generation_id(), origin = %config.origin, "examcache starting");

    let worker = build_worker(&config).await?;
    let (handle, _dispatcher) = event::spawn(Arc::clone(&worker));

    let result = run(cli.command, &config, &worker, &handle).await;

    // Let stale-while-revalidate refreshes land before the process exits
    worker.executor().settle().await;
    result
}

// ============================================================================
// Commands
// ============================================================================

async fn run(command: Command, config: &Config, worker: &Worker, handle: &WorkerHandle) -> Result<()> {
    match command {
        Command::Install => {
            let count = handle.install().await.context("Install failed")?;
            println!(
                "Cached {} assets in {}",
                count,
                worker.registry().names().name(CacheRole::Static)
            );
            println!("State: {}", handle.state());
        }
        Command::Activate => {
            let deleted = handle.activate().await.context("Activation failed")?;
            if deleted.is_empty() {
                println!("Activated, no old caches");
            } else {
                println!("Activated, deleted {}", deleted.join(", "));
            }
        }
        Command::Fetch { url, document, body } => {
            let url = config.resolve(&url)?;
            let request = if document {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            match handle.fetch(request).await? {
                FetchOutcome::Bypass => {
                    println!("Not intercepted (worker is {})", handle.state());
                }
                FetchOutcome::Responded { strategy, response } => {
                    println!(
                        "{} {} via {} ({} bytes)",
                        response.status,
                        response.status_text,
                        strategy,
                        response.body.len()
                    );
                    if body {
                        println!("{}", response.text());
                    }
                }
            }
        }
        Command::Enqueue { id, payload } => {
            let payload: Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            if worker.enqueue(id.as_str(), payload).await? {
                println!("Queued {}", id);
            } else {
                println!("{} is already queued", id);
            }
        }
        Command::Sync { tag } => {
            let tag = tag.unwrap_or_else(|| config.sync_tag.clone());
            match handle.sync(tag.as_str()).await? {
                Some(report) => {
                    println!(
                        "Submitted {}, failed {}, remaining {}",
                        report.submitted.len(),
                        report.failed.len(),
                        report.remaining
                    );
                    for id in &report.failed {
                        println!("  failed: {}", id);
                    }
                }
                None => println!("Ignored sync tag {}", tag),
            }
        }
        Command::Push { click } => {
            let Some(id) = handle.push(None).await? else {
                println!("Notification could not be shown");
                return Ok(());
            };
            if let Some(action) = click {
                handle.click(id, Some(action)).await?;
            }
        }
        Command::Click { id, action } => {
            handle.click(id, action).await?;
        }
        Command::Message { json } => {
            let data: Value = serde_json::from_str(&json).context("Message is not valid JSON")?;
            if let Some(reply) = handle.message(data).await? {
                println!("{}", serde_json::to_string(&reply)?);
            }
        }
        Command::Status { entries } => print_status(worker, entries).await?,
    }
    Ok(())
}

async fn print_status(worker: &Worker, show_entries: bool) -> Result<()> {
    println!("Version: {}", worker.generation_id());
    println!("State:   {}", worker.state());

    let registry = worker.registry();
    println!("Stores:");
    for store in registry.stores().await? {
        let entries = match registry.entries(&store).await {
            Ok(entries) => entries,
            Err(e) => {
                println!("  {} (unreadable: {})", store, e);
                continue;
            }
        };
        println!("  {} ({} entries)", store, entries.len());
        if show_entries {
            for (key, cached) in &entries {
                println!(
                    "    {} {} {}",
                    cached.data.status,
                    key.url(),
                    cached.age_display()
                );
            }
        }
    }

    let items = worker.sync_queue().items().await;
    println!("Pending submissions: {}", items.len());
    for item in items {
        let error = item.last_error.as_deref().unwrap_or("-");
        println!(
            "  {} queued {} attempts {} last error {}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M"),
            item.attempts,
            error
        );
    }
    Ok(())
}
