//! Shared fakes for the cache integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lorekeeper::cache::{
    CacheEntry, CacheSettings, CacheStore, Cacheable, Clock, EntityCache, EntityKind, ManualClock, MemoryStore,
    UpstreamError,
};
use lorekeeper::upstream::{Fetcher, Page};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub name: String,
    pub revision: u32,
}

impl Cacheable for Widget {
    const KIND: EntityKind = EntityKind::Item;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn widget(id: &str, name: &str) -> Widget {
    Widget {
        id: id.to_owned(),
        name: name.to_owned(),
        revision: 1,
    }
}

/// A fixed starting instant so timestamps in assertions are readable.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

pub fn settings(ttl: Duration) -> CacheSettings {
    CacheSettings {
        ttl,
        ..CacheSettings::default()
    }
}

/// An [`EntityCache`] wired to fakes, with handles to each fake kept for assertions.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub upstream: Arc<FakeUpstream>,
    pub clock: Arc<ManualClock>,
    pub cache: EntityCache<Widget>,
}

pub fn harness(upstream: FakeUpstream, settings: CacheSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let upstream = Arc::new(upstream);
    let clock = clock();

    let dyn_store: Arc<dyn CacheStore> = store.clone();
    let dyn_fetcher: Arc<dyn Fetcher<Widget>> = upstream.clone();
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let cache = EntityCache::new(dyn_store, dyn_fetcher, dyn_clock, settings);

    Harness {
        store,
        upstream,
        clock,
        cache,
    }
}

/// Put `payload` straight into the store with an explicit `cached_at`.
pub async fn seed(store: &MemoryStore, payload: Widget, cached_at: DateTime<Utc>, ttl: Duration) {
    let raw = CacheEntry::new(payload, cached_at, ttl).to_raw().unwrap();
    store.upsert(raw).await.unwrap();
}

/// In-memory upstream that counts calls and can be slowed down or broken.
///
/// Listings are served `page_size` items at a time with the next index as the
/// cursor. `fail_on_page` breaks one page (zero-based) of the listing.
pub struct FakeUpstream {
    widgets: Mutex<Vec<Widget>>,
    delay: Duration,
    page_size: usize,
    fail_on_page: Option<usize>,
    failing: AtomicBool,
    one_calls: AtomicUsize,
    page_calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new(widgets: Vec<Widget>) -> Self {
        Self {
            widgets: Mutex::new(widgets),
            delay: Duration::ZERO,
            page_size: 100,
            fail_on_page: None,
            failing: AtomicBool::new(false),
            one_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the upstream value for one widget.
    pub fn update(&self, payload: Widget) {
        let mut widgets = self.widgets.lock().unwrap();
        match widgets.iter_mut().find(|w| w.id == payload.id) {
            Some(existing) => *existing = payload,
            None => widgets.push(payload),
        }
    }

    pub fn one_calls(&self) -> usize {
        self.one_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.one_calls() + self.page_calls()
    }

    fn unavailable() -> UpstreamError {
        UpstreamError::new(Some(503), "upstream unavailable")
    }
}

#[async_trait]
impl Fetcher<Widget> for FakeUpstream {
    async fn fetch_one(&self, key: &str) -> Result<Widget, UpstreamError> {
        self.one_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let widgets = self.widgets.lock().unwrap();
        widgets
            .iter()
            .find(|w| w.id == key)
            .cloned()
            .ok_or_else(|| UpstreamError::not_found(format!("widget `{key}`")))
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<Widget>, UpstreamError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let page_index = start / self.page_size;
        if self.fail_on_page == Some(page_index) {
            return Err(Self::unavailable());
        }

        let widgets = self.widgets.lock().unwrap();
        let end = (start + self.page_size).min(widgets.len());
        let items = widgets[start.min(end)..end].to_vec();
        let next = (end < widgets.len()).then(|| end.to_string());
        Ok(Page { items, next })
    }
}
