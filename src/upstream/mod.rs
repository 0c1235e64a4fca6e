//! Upstream game-data APIs and the fetch interface the cache consumes.

pub mod codex;
pub mod json;
pub mod ror;
pub mod uex;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::cache::UpstreamError;
use crate::utils::log_if_slow;

const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(2);

/// One page of an upstream listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the following page; `None` on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Retrieves current upstream values for one entity kind.
#[async_trait]
pub trait Fetcher<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn fetch_one(&self, key: &str) -> Result<T, UpstreamError>;

    /// `cursor` is `None` for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<T>, UpstreamError>;
}

/// Stand-in for an upstream with no configured endpoint. Every call fails, so
/// lookups surface a clear error and stale entries keep being served.
pub struct Unconfigured {
    pub upstream: &'static str,
}

#[async_trait]
impl<T: Send + 'static> Fetcher<T> for Unconfigured {
    async fn fetch_one(&self, _key: &str) -> Result<T, UpstreamError> {
        Err(UpstreamError::new(None, format!("{} is not configured", self.upstream)))
    }

    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<Page<T>, UpstreamError> {
        Err(UpstreamError::new(None, format!("{} is not configured", self.upstream)))
    }
}

/// Shared HTTP plumbing: a pooled client with a request timeout and a
/// per-upstream rate limiter.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpClient {
    pub fn new(timeout: Duration, requests_per_second: u32) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lorekeeper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    /// GET `url` and decode the JSON body. Non-2xx responses become `UpstreamError`
    /// carrying the status and the response text.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UpstreamError> {
        self.limiter.until_ready().await;

        let start = Instant::now();
        let resp = request.send().await?;
        let status = resp.status();
        let url = resp.url().clone();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::new(Some(status.as_u16()), text));
        }

        let body = resp.text().await?;
        log_if_slow(start, SLOW_REQUEST_THRESHOLD, url.as_str());
        trace!(url = %url, bytes = body.len(), "Upstream response received");
        json::parse_json_with_context(&body)
    }

    pub fn get(&self, url: url::Url) -> reqwest::RequestBuilder {
        self.http.get(url)
    }
}

/// Join `path` onto `base`, tolerating a missing trailing slash on the base.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<url::Url, UpstreamError> {
    let base = if base.ends_with('/') {
        base.to_owned()
    } else {
        format!("{base}/")
    };
    url::Url::parse(&base)
        .and_then(|b| b.join(path.trim_start_matches('/')))
        .map_err(|e| UpstreamError::new(None, format!("invalid upstream url {base}{path}: {e}")))
}
