//! Configuration module for the lorekeeper application.
//!
//! Values come from the process environment (after `.env` is loaded) and are
//! extracted with figment. Durations are human strings such as `"24h"`, `"90s"`
//! or `"1.5m"`; bare numbers are seconds.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::cache::{CacheSettings, EntityKind};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level for the application crate (`RUST_LOG` takes precedence).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Postgres connection string. Without it the cache lives in process memory.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Discord bot token. Without it the bot service is not started.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Graceful shutdown timeout.
    #[serde(default = "default_shutdown_timeout", deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,

    /// Default freshness window for every entity kind.
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub cache_ttl: Duration,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub item_ttl: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub recipe_ttl: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub mob_ttl: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub commodity_ttl: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub vehicle_ttl: Option<Duration>,
    /// Realm status goes stale quickly, so it does not inherit `CACHE_TTL`.
    #[serde(default = "default_server_ttl", deserialize_with = "deserialize_duration")]
    pub server_ttl: Duration,

    /// Minimum similarity score (0..=100) for a fuzzy match to be returned.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: u8,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Scheduled warm interval; unset means half of each kind's TTL.
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub warm_interval: Option<Duration>,
    /// Bound on a single upstream call.
    #[serde(default = "default_fetch_timeout", deserialize_with = "deserialize_duration")]
    pub fetch_timeout: Duration,
    /// Requests per second allowed against each upstream.
    #[serde(default = "default_upstream_rate_limit")]
    pub upstream_rate_limit: u32,

    /// Ashes of Creation codex (PostgREST) base URL.
    #[serde(default)]
    pub codex_base_url: Option<String>,
    #[serde(default)]
    pub codex_api_key: Option<String>,
    #[serde(default = "default_codex_page_size")]
    pub codex_page_size: u32,
    #[serde(default = "default_uex_base_url")]
    pub uex_base_url: String,
    /// Return of Reckoning realm status listing.
    #[serde(default)]
    pub ror_status_url: Option<String>,
}

impl Config {
    /// Cache settings for one kind, applying per-kind TTL overrides.
    pub fn cache_settings(&self, kind: EntityKind) -> CacheSettings {
        let ttl = match kind {
            EntityKind::Item => self.item_ttl,
            EntityKind::Recipe => self.recipe_ttl,
            EntityKind::Mob => self.mob_ttl,
            EntityKind::Commodity => self.commodity_ttl,
            EntityKind::Vehicle => self.vehicle_ttl,
            EntityKind::Server => Some(self.server_ttl),
        }
        .unwrap_or(self.cache_ttl);

        CacheSettings {
            ttl,
            threshold: self.match_threshold.min(crate::cache::scoring::MAX_SCORE),
            max_results: self.max_results.max(1),
            fetch_timeout: self.fetch_timeout,
            warm_interval: self.warm_interval,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_server_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_match_threshold() -> u8 {
    1
}

fn default_max_results() -> usize {
    10
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_upstream_rate_limit() -> u32 {
    5
}

fn default_codex_page_size() -> u32 {
    500
}

fn default_uex_base_url() -> String {
    "https://api.uexcorp.space/2.0".to_string()
}

/// Parse a duration string. Supports ms, s, m, h and d; bare numbers are seconds.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
    ]);
    let parsed = parser
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration `{raw}`: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("duration `{raw}` out of range: {e}"))
}

/// Accepts either a duration string or a bare number of seconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawDuration::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(RawDuration::Text(s)) => parse_duration(&s).map(Some).map_err(serde::de::Error::custom),
    }
}
