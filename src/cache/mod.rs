//! Expiring local cache with fuzzy-name lookup.
//!
//! [`EntityCache`] is what the command layer talks to. Underneath it:
//! a [`RefreshCoordinator`] for single keys, a [`FuzzyLookupService`] for
//! free-text queries, and a [`BackgroundCacheWarmer`] for whole partitions,
//! all sharing one injected [`CacheStore`] and [`Clock`].

pub mod clock;
pub mod entry;
pub mod error;
pub mod lookup;
pub mod refresh;
pub mod scoring;
pub mod store;
pub mod warmer;

use std::sync::Arc;
use std::time::Duration;

use crate::upstream::Fetcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, Cacheable, EntityKind, Link, RawEntry, Relation};
pub use error::{CacheError, StorageError, UpstreamError};
pub use lookup::{FuzzyLookupService, Match};
pub use refresh::{Freshness, RefreshCoordinator, Resolved};
pub use store::{CacheStore, MemoryStore};
pub use warmer::{BackgroundCacheWarmer, WarmReport, WarmTarget};

/// Per-kind tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub threshold: u8,
    pub max_results: usize,
    pub fetch_timeout: Duration,
    /// Scheduled warm interval; `None` means half the TTL.
    pub warm_interval: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            threshold: 1,
            max_results: 10,
            fetch_timeout: Duration::from_secs(10),
            warm_interval: None,
        }
    }
}

/// A link from an entry together with the child entry it points at, if cached.
#[derive(Debug, Clone)]
pub struct Related {
    pub link: Link,
    pub child: Option<RawEntry>,
}

/// Lookup and refresh API for one entity kind.
pub struct EntityCache<T: Cacheable> {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher<T>>,
    coordinator: RefreshCoordinator<T>,
    lookup: FuzzyLookupService<T>,
    warmer: Arc<BackgroundCacheWarmer<T>>,
    max_results: usize,
}

impl<T: Cacheable> EntityCache<T> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher<T>>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        let mut warmer = BackgroundCacheWarmer::new(
            store.clone(),
            fetcher.clone(),
            clock.clone(),
            settings.ttl,
            settings.fetch_timeout,
        );
        if let Some(interval) = settings.warm_interval {
            warmer = warmer.with_interval(interval);
        }
        let warmer = Arc::new(warmer);

        Self {
            coordinator: RefreshCoordinator::new(
                store.clone(),
                clock.clone(),
                settings.ttl,
                settings.fetch_timeout,
            ),
            lookup: FuzzyLookupService::new(
                store.clone(),
                clock,
                warmer.clone(),
                settings.ttl,
                settings.threshold,
            ),
            store,
            fetcher,
            warmer,
            max_results: settings.max_results,
        }
    }

    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    /// Ranked matches for a free-text query, capped at the configured maximum.
    pub async fn lookup(&self, query: &str) -> Result<Vec<Match<T>>, CacheError> {
        self.lookup.search(query, self.max_results).await
    }

    pub async fn lookup_limited(&self, query: &str, limit: usize) -> Result<Vec<Match<T>>, CacheError> {
        self.lookup.search(query, limit.min(self.max_results)).await
    }

    /// Resolve one entry by its upstream key. An upstream 404 with nothing cached is `None`.
    pub async fn get_by_key(&self, key: &str) -> Result<Option<Resolved<T>>, CacheError> {
        match self.coordinator.resolve(key, &self.fetcher).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(CacheError::RefreshFailed { source, .. }) if source.status == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow an entry's links to whatever child entries are currently cached.
    pub async fn related(&self, key: &str) -> Result<Vec<Related>, CacheError> {
        let links = self.store.links(T::KIND, key).await?;
        let mut related = Vec::with_capacity(links.len());
        for link in links {
            let child = match &link.child_key {
                Some(child_key) => self.store.get(link.relation.child_kind(), child_key).await?,
                None => None,
            };
            related.push(Related { link, child });
        }
        Ok(related)
    }

    /// Drop every cached entry of this kind.
    pub async fn purge(&self) -> Result<u64, CacheError> {
        Ok(self.store.delete_all(T::KIND).await?)
    }

    pub fn warmer(&self) -> Arc<BackgroundCacheWarmer<T>> {
        self.warmer.clone()
    }
}
