//! Autocomplete functions for Discord slash command parameters.
//!
//! Suggestions come from the same fuzzy ranking the commands use, so the top
//! suggestion is what the command would pick for the partial input.

use crate::bot::Context;
use crate::cache::{Cacheable, EntityCache};
use poise::serenity_prelude as serenity;
use tracing::debug;

/// Discord rejects more than 25 choices.
const MAX_CHOICES: usize = 25;
/// Discord rejects choice names longer than 100 characters.
const MAX_CHOICE_LEN: usize = 100;

async fn suggest<T: Cacheable>(cache: &EntityCache<T>, partial: &str) -> Vec<serenity::AutocompleteChoice> {
    if partial.trim().is_empty() {
        return Vec::new();
    }
    match cache.lookup_limited(partial, MAX_CHOICES).await {
        Ok(matches) => matches
            .into_iter()
            .map(|m| {
                let name: String = m.entry.name().chars().take(MAX_CHOICE_LEN).collect();
                serenity::AutocompleteChoice::new(name.clone(), name)
            })
            .collect(),
        Err(e) => {
            debug!(kind = %cache.kind(), error = %e, "Autocomplete lookup failed");
            Vec::new()
        }
    }
}

pub async fn item_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.items, partial)
        .await
        .into_iter()
}

pub async fn recipe_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.recipes, partial)
        .await
        .into_iter()
}

pub async fn mob_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.mobs, partial)
        .await
        .into_iter()
}

pub async fn commodity_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.commodities, partial)
        .await
        .into_iter()
}

pub async fn vehicle_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.vehicles, partial)
        .await
        .into_iter()
}

pub async fn server_names<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    suggest(&ctx.data().app_state.caches.servers, partial)
        .await
        .into_iter()
}

/// Entity kinds for `/purge`.
pub async fn entity_kinds<'a>(
    _ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = serenity::AutocompleteChoice> + 'a {
    let partial = partial.to_lowercase();
    crate::cache::EntityKind::ALL
        .into_iter()
        .filter(move |k| k.as_str().starts_with(&partial))
        .map(|k| serenity::AutocompleteChoice::new(k.as_str(), k.as_str()))
}
