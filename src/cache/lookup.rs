//! Fuzzy name search over one cached partition.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::Clock;
use super::entry::{CacheEntry, Cacheable};
use super::error::CacheError;
use super::scoring;
use super::store::CacheStore;
use super::warmer::BackgroundCacheWarmer;

/// Key reported in `RefreshFailed` when a whole-partition warm fails.
pub const PARTITION_KEY: &str = "*";

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct Match<T> {
    pub entry: CacheEntry<T>,
    pub score: u8,
}

pub struct FuzzyLookupService<T: Cacheable> {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    warmer: Arc<BackgroundCacheWarmer<T>>,
    ttl: Duration,
    threshold: u8,
}

impl<T: Cacheable> FuzzyLookupService<T> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        warmer: Arc<BackgroundCacheWarmer<T>>,
        ttl: Duration,
        threshold: u8,
    ) -> Self {
        Self {
            store,
            clock,
            warmer,
            ttl,
            threshold,
        }
    }

    /// Rank every cached entry against `query`, best first.
    ///
    /// An empty partition is warmed (and awaited) first. A partition holding any
    /// stale entry is searched as-is while a background warm is scheduled. An
    /// empty result is not an error.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Match<T>>, CacheError> {
        let mut raws = self.store.get_all(T::KIND).await?;

        if raws.is_empty() {
            debug!(kind = %T::KIND, "Partition empty, warming before search");
            let report = self.warmer.warm_all().await;
            raws = self.store.get_all(T::KIND).await?;

            if raws.is_empty()
                && let Some(error) = report.error
            {
                return Err(match error {
                    CacheError::Upstream(source) => CacheError::RefreshFailed {
                        kind: T::KIND,
                        key: PARTITION_KEY.to_owned(),
                        source,
                    },
                    other => other,
                });
            }
        }

        let entries = raws
            .into_iter()
            .map(|raw| CacheEntry::<T>::from_raw(raw, self.ttl))
            .collect::<Result<Vec<_>, _>>()?;

        let now = self.clock.now();
        if entries.iter().any(|e| !e.is_fresh(now)) {
            debug!(kind = %T::KIND, "Partition has stale entries, scheduling warm");
            self.warmer.warm_in_background();
        }

        let matches = rank(query, entries, self.threshold, max_results);
        trace!(kind = %T::KIND, query, hits = matches.len(), "Fuzzy search complete");
        Ok(matches)
    }
}

/// Score, filter by `threshold`, and sort: score descending, then name, then key.
pub fn rank<T: Cacheable>(
    query: &str,
    entries: Vec<CacheEntry<T>>,
    threshold: u8,
    max_results: usize,
) -> Vec<Match<T>> {
    let mut matches: Vec<Match<T>> = entries
        .into_iter()
        .filter_map(|entry| {
            let score = scoring::score(query, entry.name());
            (score >= threshold).then_some(Match { entry, score })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.entry.name().cmp(b.entry.name()))
            .then_with(|| a.entry.key.cmp(&b.entry.key))
    });
    matches.truncate(max_results);
    matches
}
