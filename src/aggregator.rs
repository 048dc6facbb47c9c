use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::feed::fetcher::SourceFetcher;
use crate::feed::merge::merge;
use crate::feed::{FeedSource, NewsItem};
use crate::storage::{CacheStore, FileCacheStore};

/// One published frame of the aggregate: the merged set so far, a status
/// line, and the timestamp the set was last made current. Republished after
/// cache seeding and after every source settlement, so subscribers can
/// render progressively instead of waiting for the full fan-out.
#[derive(Debug, Clone)]
pub struct AggregateUpdate {
    pub items: Vec<NewsItem>,
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AggregateUpdate {
    fn idle() -> Self {
        Self {
            items: Vec::new(),
            status: "idle".to_string(),
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// Drives the refresh cycle: seed from cache, fan out one fetch per source,
/// fold each settlement into the working set, publish progress, persist the
/// final set. At most one cycle runs at a time; the working merged set is
/// owned by that cycle alone.
pub struct NewsAggregator {
    sources: Vec<FeedSource>,
    fetcher: SourceFetcher,
    cache: Arc<dyn CacheStore>,
    state: Mutex<RunState>,
    tx: watch::Sender<AggregateUpdate>,
    rx: watch::Receiver<AggregateUpdate>,
}

impl NewsAggregator {
    pub fn new(sources: Vec<FeedSource>, fetcher: SourceFetcher, cache: Arc<dyn CacheStore>) -> Self {
        let (tx, rx) = watch::channel(AggregateUpdate::idle());
        Self {
            sources,
            fetcher,
            cache,
            state: Mutex::new(RunState::Idle),
            tx,
            rx,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = SourceFetcher::new()
            .with_timeout(Duration::from_millis(config.settings.timeout_ms))
            .with_proxy(config.settings.proxy_url.clone())
            .with_user_agent(config.settings.user_agent.clone());

        let cache_path = match &config.settings.cache_path {
            Some(path) => path.clone(),
            None => FileCacheStore::default_path()?,
        };
        let cache = Arc::new(
            FileCacheStore::new(cache_path)
                .with_ttl(Duration::from_millis(config.settings.cache_ttl_ms)),
        );

        Ok(Self::new(config.sources.clone(), fetcher, cache))
    }

    /// Subscription point for the excluded UI layer: receives the merged
    /// set and status after every settlement.
    pub fn subscribe(&self) -> watch::Receiver<AggregateUpdate> {
        self.tx.subscribe()
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn items(&self) -> Vec<NewsItem> {
        self.rx.borrow().items.clone()
    }

    pub fn status(&self) -> String {
        self.rx.borrow().status.clone()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.rx.borrow().updated_at
    }

    /// The current merged set narrowed by the pure filter predicate.
    pub fn filtered_items(&self, keyword: &str, source: &str) -> Vec<NewsItem> {
        self.rx
            .borrow()
            .items
            .iter()
            .filter(|item| item.matches(keyword, source))
            .cloned()
            .collect()
    }

    /// Run one refresh cycle. Returns `false` without doing anything when a
    /// cycle is already in flight; requests are dropped, not queued.
    pub async fn refresh(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == RunState::Running {
                debug!("refresh already in flight, dropping request");
                return false;
            }
            *state = RunState::Running;
        }

        self.run_cycle().await;

        *self.state.lock() = RunState::Idle;
        true
    }

    async fn run_cycle(&self) {
        // Seeding
        let mut merged: Vec<NewsItem> = Vec::new();
        let mut cached_updated_at = None;

        if let Some(snapshot) = self.cache.load().await {
            info!(items = snapshot.items.len(), updated_at = %snapshot.updated_at, "seeding from cache");
            cached_updated_at = Some(snapshot.updated_at);
            merged = snapshot.items;
            self.publish(
                merged.clone(),
                format!(
                    "showing cached results from {}",
                    snapshot.updated_at.to_rfc3339()
                ),
                cached_updated_at,
            );
        }
        let had_cache = cached_updated_at.is_some();

        // Fetching: every source launched at once, folded in settlement
        // order. A slow source never blocks or cancels its siblings.
        let total = self.sources.len();
        let mut settled = 0usize;
        let mut failed = 0usize;

        let mut fetches: FuturesUnordered<_> = self
            .sources
            .iter()
            .map(|source| async move { (source.name.as_str(), self.fetcher.fetch(source).await) })
            .collect();

        while let Some((name, result)) = fetches.next().await {
            settled += 1;
            match result {
                Ok(items) => {
                    debug!(source = name, count = items.len(), "source settled");
                    merged = merge(&merged, &items);
                }
                Err(e) => {
                    warn!(source = name, error = %e, "source unavailable");
                    failed += 1;
                }
            }
            self.publish(
                merged.clone(),
                format!("updating {}/{} sources ({} failed)", settled, total, failed),
                cached_updated_at,
            );
        }

        // Finalizing
        if total > 0 && failed == total && !had_cache {
            warn!("every source failed and no cache was available");
            self.publish(
                Vec::new(),
                "all sources failed and no cached results were available".to_string(),
                None,
            );
            return;
        }

        let updated_at = Utc::now();
        if let Err(e) = self.cache.save(&merged, updated_at).await {
            warn!(error = %e, "failed to persist cache snapshot");
        }
        info!(items = merged.len(), failed, "refresh cycle complete");
        self.publish(
            merged.clone(),
            format!(
                "retrieved {} items from {} sources ({} failed)",
                merged.len(),
                total - failed,
                failed
            ),
            Some(updated_at),
        );
    }

    fn publish(&self, items: Vec<NewsItem>, status: String, updated_at: Option<DateTime<Utc>>) {
        self.tx.send_replace(AggregateUpdate {
            items,
            status,
            updated_at,
        });
    }
}
