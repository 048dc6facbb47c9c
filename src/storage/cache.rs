use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::feed::NewsItem;

/// Maximum snapshot age before the cache is treated as absent.
pub const CACHE_TTL: Duration = Duration::from_millis(600_000);

/// The single persisted slot: the last successful aggregate plus its
/// timestamp. Timestamps serialize as ISO-8601 text so the slot
/// round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub updated_at: DateTime<Utc>,
    pub items: Vec<NewsItem>,
}

/// Narrow persistence boundary for the aggregate snapshot, so the backing
/// mechanism (file, in-memory stub) is swappable without touching the merge
/// or fetch logic. `load` fails soft: corruption and expiry both read as
/// an absent cache, never as an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self) -> Option<CacheSnapshot>;

    /// Overwrites any prior snapshot unconditionally; single slot, no
    /// versioning or history.
    async fn save(&self, items: &[NewsItem], updated_at: DateTime<Utc>) -> Result<()>;
}

/// JSON slot on disk, written atomically via a temp file rename.
pub struct FileCacheStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileCacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ttl: CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn default_path() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("newsdeck").join("news_cache.json"))
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))
    }

    fn is_expired(&self, snapshot: &CacheSnapshot) -> bool {
        let age = Utc::now().signed_duration_since(snapshot.updated_at);
        age.num_milliseconds() > self.ttl.as_millis() as i64
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self) -> Option<CacheSnapshot> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %self.path.display(), "no cache file");
                return None;
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding corrupt cache");
                return None;
            }
        };

        if self.is_expired(&snapshot) {
            debug!(updated_at = %snapshot.updated_at, "cache expired");
            return None;
        }

        debug!(items = snapshot.items.len(), "loaded cache snapshot");
        Some(snapshot)
    }

    async fn save(&self, items: &[NewsItem], updated_at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Cache(format!(
                    "Failed to create cache directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let snapshot = CacheSnapshot {
            updated_at,
            items: items.to_vec(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let temp_file = self.path.with_extension("tmp");
        tokio::fs::write(&temp_file, json).await.map_err(|e| {
            Error::Cache(format!(
                "Failed to write cache to '{}': {}",
                temp_file.display(),
                e
            ))
        })?;
        tokio::fs::rename(&temp_file, &self.path).await.map_err(|e| {
            Error::Cache(format!(
                "Failed to move cache into place at '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }
}

/// In-memory stand-in for tests; same TTL semantics as the file store.
pub struct MemoryCacheStore {
    slot: Mutex<Option<CacheSnapshot>>,
    ttl: Duration,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ttl: CACHE_TTL,
        }
    }

    pub fn preloaded(items: Vec<NewsItem>, updated_at: DateTime<Utc>) -> Self {
        Self {
            slot: Mutex::new(Some(CacheSnapshot { updated_at, items })),
            ttl: CACHE_TTL,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self) -> Option<CacheSnapshot> {
        let snapshot = self.slot.lock().clone()?;
        let age = Utc::now().signed_duration_since(snapshot.updated_at);
        if age.num_milliseconds() > self.ttl.as_millis() as i64 {
            return None;
        }
        Some(snapshot)
    }

    async fn save(&self, items: &[NewsItem], updated_at: DateTime<Utc>) -> Result<()> {
        *self.slot.lock() = Some(CacheSnapshot {
            updated_at,
            items: items.to_vec(),
        });
        Ok(())
    }
}
