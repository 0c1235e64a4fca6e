//! Full-partition refresh by paging through an upstream listing.
//!
//! Each page is upserted as soon as it arrives, so a failure part-way through
//! keeps everything fetched before it. Concurrent warm requests for the same
//! kind share one run.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::entry::{CacheEntry, Cacheable, EntityKind};
use super::error::{CacheError, UpstreamError};
use super::store::CacheStore;
use crate::upstream::Fetcher;
use crate::utils::fmt_duration;

/// Hard stop for upstreams whose cursors never terminate.
const MAX_PAGES: usize = 10_000;

type SharedWarm = Shared<BoxFuture<'static, WarmReport>>;

/// Outcome of one warm run.
#[derive(Debug, Clone)]
pub struct WarmReport {
    pub kind: EntityKind,
    pub pages: usize,
    pub upserted: usize,
    /// First failure that stopped the run, if any. Entries upserted before it are kept.
    pub error: Option<CacheError>,
}

impl WarmReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            pages: 0,
            upserted: 0,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct BackgroundCacheWarmer<T: Cacheable> {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher<T>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    fetch_timeout: Duration,
    interval: Duration,
    inflight: Arc<Mutex<Option<SharedWarm>>>,
}

impl<T: Cacheable> BackgroundCacheWarmer<T> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher<T>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
            ttl,
            fetch_timeout,
            interval: ttl / 2,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the scheduled warm interval (defaults to half the TTL).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Walk every upstream page and upsert each item. Joins a run already in progress.
    pub async fn warm_all(&self) -> WarmReport {
        self.start().await
    }

    /// Kick off a warm without waiting for it.
    pub fn warm_in_background(&self) {
        drop(self.start());
    }

    fn start(&self) -> SharedWarm {
        let mut slot = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = slot.as_ref() {
            debug!(kind = %T::KIND, "Joining in-flight warm");
            return running.clone();
        }

        let guard = WarmGuard {
            inflight: self.inflight.clone(),
        };
        let task = tokio::spawn(run_warm(
            self.store.clone(),
            self.fetcher.clone(),
            self.clock.clone(),
            self.ttl,
            self.fetch_timeout,
            guard,
        ));
        let shared = async move {
            task.await.unwrap_or_else(|e| WarmReport {
                error: Some(UpstreamError::new(None, format!("warm task failed: {e}")).into()),
                ..WarmReport::new(T::KIND)
            })
        }
        .boxed()
        .shared();
        *slot = Some(shared.clone());
        shared
    }
}

struct WarmGuard {
    inflight: Arc<Mutex<Option<SharedWarm>>>,
}

impl Drop for WarmGuard {
    fn drop(&mut self) {
        *self.inflight.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

async fn run_warm<T: Cacheable>(
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher<T>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    fetch_timeout: Duration,
    _guard: WarmGuard,
) -> WarmReport {
    let start = Instant::now();
    let mut report = WarmReport::new(T::KIND);
    let mut cursor: Option<String> = None;

    info!(kind = %T::KIND, "Cache warm started");

    loop {
        let page = match tokio::time::timeout(fetch_timeout, fetcher.fetch_page(cursor.as_deref())).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!(kind = %T::KIND, cursor = ?cursor, error = %e, "Failed to fetch page, keeping progress");
                report.error = Some(e.into());
                break;
            }
            Err(_elapsed) => {
                warn!(kind = %T::KIND, cursor = ?cursor, "Page fetch timed out, keeping progress");
                report.error = Some(UpstreamError::timeout(fetch_timeout).into());
                break;
            }
        };

        report.pages += 1;
        let now = clock.now();
        for item in page.items {
            let entry = CacheEntry::new(item, now, ttl);
            let stored = match entry.to_raw() {
                Ok(raw) => store.upsert(raw).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                warn!(kind = %T::KIND, key = %entry.key, error = %e, "Failed to store warmed entry");
                report.error = Some(e.into());
                return finish(report, start);
            }
            report.upserted += 1;
        }

        match page.next {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                warn!(kind = %T::KIND, cursor = %next, "Upstream repeated a cursor, stopping");
                break;
            }
            Some(next) if report.pages < MAX_PAGES => {
                debug!(kind = %T::KIND, fetched = report.upserted, "Warm pagination: fetching next page");
                cursor = Some(next);
            }
            Some(_) => {
                warn!(kind = %T::KIND, pages = report.pages, "Page limit reached, stopping");
                break;
            }
            None => break,
        }
    }

    finish(report, start)
}

fn finish(report: WarmReport, start: Instant) -> WarmReport {
    info!(
        kind = %report.kind,
        pages = report.pages,
        upserted = report.upserted,
        complete = report.is_complete(),
        duration = fmt_duration(start.elapsed()),
        "Cache warm finished"
    );
    report
}

/// Type-erased handle so one scheduler can drive warmers of every kind.
#[async_trait]
pub trait WarmTarget: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn interval(&self) -> Duration;

    async fn warm(&self) -> WarmReport;
}

#[async_trait]
impl<T: Cacheable> WarmTarget for BackgroundCacheWarmer<T> {
    fn kind(&self) -> EntityKind {
        T::KIND
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn warm(&self) -> WarmReport {
        self.warm_all().await
    }
}
