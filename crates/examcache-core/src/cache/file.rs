//! JSON-file cache backend.
//!
//! Each store lives in `<dir>/<store>.json`. Every write replaces the whole
//! file through a temp file and a rename, so readers never observe a
//! half-written store. The directory is expected to hold nothing but
//! store files; any `*.json` in it is treated as a store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backend::{CacheBackend, CachedResponse};
use crate::error::CacheError;
use crate::models::CacheKey;

const STORE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    created_at: DateTime<Utc>,
    entries: BTreeMap<CacheKey, CachedResponse>,
}

impl StoreFile {
    fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

pub struct FileBackend {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on store files
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub async fn new(dir: PathBuf) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn store_path(&self, store: &str) -> Result<PathBuf, CacheError> {
        let valid = !store.is_empty()
            && store
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !store.starts_with('.');
        if !valid {
            return Err(CacheError::InvalidStoreName(store.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", store, STORE_EXTENSION)))
    }

    async fn load(&self, store: &str) -> Result<Option<StoreFile>, CacheError> {
        let path = self.store_path(store)?;
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    async fn save(&self, store: &str, file: &StoreFile) -> Result<(), CacheError> {
        let path = self.store_path(store)?;
        let contents = serde_json::to_vec(file)?;
        write_atomic(&path, &contents).await
    }
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn open(&self, store: &str) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;
        if self.load(store).await?.is_some() {
            return Ok(false);
        }
        self.save(store, &StoreFile::empty()).await?;
        debug!(store, "Created store");
        Ok(true)
    }

    async fn has(&self, store: &str) -> Result<bool, CacheError> {
        let path = self.store_path(store)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CacheError::io(path, e))
    }

    async fn stores(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let mut found = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let created_at = match self.load(name).await {
                Ok(Some(file)) => file.created_at,
                // Removed since the listing, or a name no store could have
                Ok(None) | Err(CacheError::InvalidStoreName(_)) => continue,
                // Listed first so a purge can still remove it
                Err(e) => {
                    warn!(store = name, error = %e, "Store file is unreadable");
                    DateTime::<Utc>::MIN_UTC
                }
            };
            found.push((created_at, name.to_string()));
        }
        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    async fn delete(&self, store: &str) -> Result<bool, CacheError> {
        let _guard = self.write_lock.lock().await;
        let path = self.store_path(store)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    async fn put_all(
        &self,
        store: &str,
        entries: Vec<(CacheKey, CachedResponse)>,
    ) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(store).await?.unwrap_or_else(StoreFile::empty);
        file.entries.extend(entries);
        self.save(store, &file).await
    }

    async fn get(
        &self,
        store: &str,
        key: &CacheKey,
    ) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self
            .load(store)
            .await?
            .and_then(|mut file| file.entries.remove(key)))
    }

    async fn keys(&self, store: &str) -> Result<Vec<CacheKey>, CacheError> {
        Ok(self
            .load(store)
            .await?
            .map(|file| file.entries.into_keys().collect())
            .unwrap_or_default())
    }
}
