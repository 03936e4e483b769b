//! Coordinator configuration.
//!
//! Configuration is stored at `~/.config/examcache/config.json`. Every field
//! has a default, so a missing or partial file is fine. `EXAMCACHE_ORIGIN`
//! and `EXAMCACHE_CACHE_DIR` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheNames;
use crate::error::WorkerError;
use crate::notify::NotificationAction;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "examcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ORIGIN_ENV: &str = "EXAMCACHE_ORIGIN";
const CACHE_DIR_ENV: &str = "EXAMCACHE_CACHE_DIR";

/// Default network deadline in seconds, matching the HTTP client timeout.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache generation; store names and the version reply derive from it
    pub version: String,
    /// Base URL that relative manifest paths resolve against
    pub origin: String,
    pub cache_dir: Option<PathBuf>,
    pub precache: Vec<String>,
    pub network_first: Vec<String>,
    pub cache_first: Vec<String>,
    pub offline_fallback: String,
    pub sync_tag: String,
    pub sync_endpoint: String,
    /// `None` leaves network waits unbounded
    pub fetch_timeout_secs: Option<u64>,
    pub skip_waiting_on_install: bool,
    pub notification: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            origin: "http://localhost:8080/".to_string(),
            cache_dir: None,
            precache: [
                "/",
                "/index.html",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
                "/offline.html",
                "https://fonts.googleapis.com/css2?family=Sarabun:ital,wght@0,300;0,400;0,500;0,600;0,700;1,400&display=swap",
                "https://unpkg.com/@supabase/supabase-js@2",
            ]
            .map(String::from)
            .to_vec(),
            network_first: ["https://api.supabase.co", "/api/", "https://fonts.gstatic.com"]
                .map(String::from)
                .to_vec(),
            cache_first: [
                "https://fonts.googleapis.com",
                "https://unpkg.com",
                "/icons/",
                "/images/",
            ]
            .map(String::from)
            .to_vec(),
            offline_fallback: "/offline.html".to_string(),
            sync_tag: "exam-result-sync".to_string(),
            sync_endpoint: "/api/exam-results".to_string(),
            fetch_timeout_secs: Some(DEFAULT_FETCH_TIMEOUT_SECS),
            skip_waiting_on_install: true,
            notification: NotificationConfig::default(),
        }
    }
}

/// Static notification content shown for every push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Route opened by the `explore` action
    pub explore_route: String,
    pub actions: Vec<NotificationAction>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "คลังข้อสอบออนไลน์".to_string(),
            body: "คุณมีข้อสอบใหม่รอทำ!".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            explore_route: "/?page=exams".to_string(),
            actions: vec![
                NotificationAction {
                    action: "explore".to_string(),
                    title: "ดูข้อสอบ".to_string(),
                    icon: Some("/icons/checkmark.png".to_string()),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "ปิด".to_string(),
                    icon: Some("/icons/xmark.png".to_string()),
                },
            ],
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `EXAMCACHE_ORIGIN` and `EXAMCACHE_CACHE_DIR` if set.
    pub fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            self.origin = origin;
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Identifier reported by the version query
    pub fn generation_id(&self) -> String {
        format!("exam-app-v{}", self.version)
    }

    pub fn cache_names(&self) -> CacheNames {
        CacheNames::for_version(&self.version)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn origin_url(&self) -> Result<Url, WorkerError> {
        Url::parse(&self.origin)
            .map_err(|e| WorkerError::Config(format!("invalid origin {:?}: {}", self.origin, e)))
    }

    /// Resolve a path against the origin. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url, WorkerError> {
        self.origin_url()?
            .join(path)
            .map_err(|e| WorkerError::Config(format!("invalid path {:?}: {}", path, e)))
    }

    pub fn precache_urls(&self) -> Result<Vec<Url>, WorkerError> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generation_id(), "exam-app-v1.0.0");
        assert_eq!(config.cache_names().static_store, "static-v1.0.0");
        assert_eq!(config.cache_names().dynamic_store, "dynamic-v1.0.0");
        assert_eq!(config.precache.len(), 8);
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.notification.actions.len(), 2);
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = Config {
            origin: "https://exams.example.com/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.resolve("/offline.html").unwrap().as_str(),
            "https://exams.example.com/offline.html"
        );
        assert_eq!(
            config.resolve("https://unpkg.com/@supabase/supabase-js@2").unwrap().as_str(),
            "https://unpkg.com/@supabase/supabase-js@2"
        );
    }

    #[test]
    fn test_invalid_origin() {
        let config = Config {
            origin: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.origin_url(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"version": "2.0.0", "fetch_timeout_secs": null}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.version, "2.0.0");
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.sync_tag, "exam-result-sync");
        assert_eq!(config.offline_fallback, "/offline.html");
    }

    #[test]
    fn test_cache_dir_override() {
        let config = Config {
            cache_dir: Some(PathBuf::from("/tmp/examcache-test")),
            ..Config::default()
        };
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/examcache-test"));
    }
}
