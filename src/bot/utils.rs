//! Bot command utilities.

use num_format::{Locale, ToFormattedString};

use crate::cache::{CacheError, Cacheable, EntityCache, Freshness, Match, Resolved};

/// Discord's message length limit.
const MAX_MESSAGE_LEN: usize = 2000;

/// Best match for `query` resolved through the refresh path, plus the runners-up.
pub struct Lookup<T> {
    pub best: Resolved<T>,
    pub others: Vec<Match<T>>,
}

/// Rank `query`, then resolve the top hit by key so an expired entry is refreshed
/// (or served stale) before it is shown.
pub async fn lookup_best<T: Cacheable>(cache: &EntityCache<T>, query: &str) -> Result<Option<Lookup<T>>, CacheError> {
    let mut matches = cache.lookup(query).await?;
    if matches.is_empty() {
        return Ok(None);
    }
    let top = matches.remove(0);

    let best = match cache.get_by_key(&top.entry.key).await? {
        Some(resolved) => resolved,
        // Upstream no longer knows the key; show what the search found.
        None => Resolved {
            entry: top.entry,
            freshness: Freshness::Fresh,
        },
    };
    Ok(Some(Lookup { best, others: matches }))
}

/// User-facing text for a lookup failure.
pub fn describe_error(error: &CacheError) -> String {
    match error {
        CacheError::RefreshFailed { kind, .. } => {
            format!("Couldn't reach the {kind} data source and nothing is cached yet. Try again later.")
        }
        CacheError::Upstream(_) => "The data source returned an error. Try again later.".to_owned(),
        CacheError::Storage(_) => "The cache is unavailable right now.".to_owned(),
    }
}

/// Trailing note for entries served past their TTL.
pub fn freshness_note<T>(resolved: &Resolved<T>) -> &'static str {
    if resolved.is_stale() {
        "\n-# Showing cached data; the source could not be reached."
    } else {
        ""
    }
}

/// "Also matched: a, b, c" line, or nothing.
pub fn others_line<T: Cacheable>(others: &[Match<T>]) -> String {
    if others.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = others.iter().take(5).map(|m| m.entry.name()).collect();
    format!("\nAlso matched: {}", names.join(", "))
}

/// Round a price to whole credits with thousands separators.
pub fn fmt_credits(value: f64) -> String {
    format!("{} aUEC", (value.round() as i64).to_formatted_string(&Locale::en))
}

pub fn fmt_rate(rate: Option<f32>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "?".to_owned(),
    }
}

/// Clip a reply to Discord's length limit on a char boundary.
pub fn clip(mut text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_LEN {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(MAX_MESSAGE_LEN - 1)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.truncate(cut);
    text.push('…');
    text
}
