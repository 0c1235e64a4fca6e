//! Serve-fresh / refresh / serve-stale decisions with per-key singleflight.
//!
//! At most one upstream fetch per key is outstanding at any instant. Callers
//! arriving while it runs await the same shared future. The fetch itself runs
//! on a spawned task so an abandoned caller never cancels it: the result still
//! lands in the store for whoever asks next.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::clock::Clock;
use super::entry::{CacheEntry, Cacheable};
use super::error::{CacheError, UpstreamError};
use super::store::CacheStore;
use crate::upstream::Fetcher;
use crate::utils::log_if_slow;

const SLOW_FETCH_THRESHOLD: Duration = Duration::from_secs(2);

type SharedFetch<T> = Shared<BoxFuture<'static, Result<CacheEntry<T>, CacheError>>>;

/// Where a resolved value came from.
#[derive(Debug, Clone)]
pub enum Freshness {
    /// Served from the store without contacting upstream.
    Fresh,
    /// Fetched from upstream during this call (or a call it coalesced onto).
    Refreshed,
    /// Refresh failed; this is the expired cached value.
    Stale(UpstreamError),
}

#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub entry: CacheEntry<T>,
    pub freshness: Freshness,
}

impl<T> Resolved<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale(_))
    }
}

pub struct RefreshCoordinator<T: Cacheable> {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    fetch_timeout: Duration,
    /// key → in-flight fetch shared by every concurrent caller
    inflight: Arc<DashMap<String, SharedFetch<T>>>,
}

impl<T: Cacheable> RefreshCoordinator<T> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            fetch_timeout,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Return the payload for `key`, fetching it from upstream if missing or stale.
    pub async fn resolve(
        &self,
        key: &str,
        fetcher: &Arc<dyn Fetcher<T>>,
    ) -> Result<Resolved<T>, CacheError> {
        let cached = match self.store.get(T::KIND, key).await? {
            Some(raw) => Some(CacheEntry::<T>::from_raw(raw, self.ttl)?),
            None => None,
        };

        if let Some(entry) = &cached
            && entry.is_fresh(self.clock.now())
        {
            return Ok(Resolved {
                entry: entry.clone(),
                freshness: Freshness::Fresh,
            });
        }

        match self.shared_fetch(key, fetcher).await {
            Ok(entry) => Ok(Resolved {
                entry,
                freshness: Freshness::Refreshed,
            }),
            Err(CacheError::Upstream(error)) => match cached {
                Some(stale) => {
                    warn!(
                        kind = %T::KIND,
                        key,
                        cached_at = %stale.cached_at,
                        error = %error,
                        "Refresh failed, serving stale entry"
                    );
                    Ok(Resolved {
                        entry: stale,
                        freshness: Freshness::Stale(error),
                    })
                }
                None => Err(CacheError::RefreshFailed {
                    kind: T::KIND,
                    key: key.to_owned(),
                    source: error,
                }),
            },
            Err(other) => Err(other),
        }
    }

    /// Join the in-flight fetch for `key`, or start one.
    fn shared_fetch(&self, key: &str, fetcher: &Arc<dyn Fetcher<T>>) -> SharedFetch<T> {
        match self.inflight.entry(key.to_owned()) {
            Entry::Occupied(occupied) => {
                debug!(kind = %T::KIND, key, "Joining in-flight fetch");
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let guard = InflightGuard {
                    inflight: self.inflight.clone(),
                    key: key.to_owned(),
                };
                let task = tokio::spawn(fetch_and_store(
                    self.store.clone(),
                    self.clock.clone(),
                    fetcher.clone(),
                    key.to_owned(),
                    self.ttl,
                    self.fetch_timeout,
                    guard,
                ));
                let shared = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(UpstreamError::new(None, format!("fetch task failed: {e}")).into())
                    })
                }
                .boxed()
                .shared();
                vacant.insert(shared.clone());
                shared
            }
        }
    }
}

/// Clears the singleflight slot once the fetch finishes, even on panic.
struct InflightGuard<T: Cacheable> {
    inflight: Arc<DashMap<String, SharedFetch<T>>>,
    key: String,
}

impl<T: Cacheable> Drop for InflightGuard<T> {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

async fn fetch_and_store<T: Cacheable>(
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn Fetcher<T>>,
    key: String,
    ttl: Duration,
    fetch_timeout: Duration,
    _guard: InflightGuard<T>,
) -> Result<CacheEntry<T>, CacheError> {
    let start = Instant::now();
    let payload = match tokio::time::timeout(fetch_timeout, fetcher.fetch_one(&key)).await {
        Ok(result) => result?,
        Err(_elapsed) => return Err(UpstreamError::timeout(fetch_timeout).into()),
    };
    log_if_slow(start, SLOW_FETCH_THRESHOLD, "upstream fetch_one");

    let entry = CacheEntry::new(payload, clock.now(), ttl);
    // Storing under a foreign key would leave `key` permanently missing.
    if entry.key != key {
        warn!(kind = %T::KIND, requested = %key, returned = %entry.key, "Upstream returned a different key");
        return Err(UpstreamError::malformed(format!(
            "{} `{key}` came back as `{}`",
            T::KIND,
            entry.key
        ))
        .into());
    }
    store.upsert(entry.to_raw()?).await?;
    debug!(kind = %T::KIND, key = %entry.key, "Cache entry refreshed");
    Ok(entry)
}
