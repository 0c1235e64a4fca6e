//! Slash commands. Each resolves a free-text name through the cache and replies in plain text.

use std::fmt::Write;
use tracing::{info, warn};

use crate::bot::autocomplete;
use crate::bot::utils::{Lookup, clip, describe_error, fmt_credits, fmt_rate, freshness_note, lookup_best, others_line};
use crate::bot::{Context, Error};
use crate::cache::{CacheError, Cacheable, EntityCache, EntityKind, Related, Relation};
use crate::models::{Commodity, Item, Mob, Recipe, ServerStatus, Vehicle};

/// Reply with the rendered hit, or explain a miss or failure.
async fn respond(
    ctx: Context<'_>,
    kind: EntityKind,
    query: &str,
    outcome: Result<Option<String>, CacheError>,
) -> Result<(), Error> {
    let reply = match outcome {
        Ok(Some(text)) => text,
        Ok(None) => format!("No {kind} matching `{query}`."),
        Err(e) => {
            warn!(kind = %kind, query, error = %e, "Lookup failed");
            describe_error(&e)
        }
    };

    ctx.say(clip(reply)).await?;
    Ok(())
}

/// Look up and render without following links.
async fn simple_lookup<T: Cacheable>(
    cache: &EntityCache<T>,
    query: &str,
    render: fn(&Lookup<T>) -> String,
) -> Result<Option<String>, CacheError> {
    Ok(lookup_best(cache, query).await?.map(|found| render(&found)))
}

fn child_name(related: &Related) -> String {
    match (&related.child, &related.link.child_key) {
        (Some(child), _) => child.name.clone(),
        (None, Some(key)) => format!("`{key}`"),
        (None, None) => "(removed)".to_owned(),
    }
}

pub fn render_item(found: &Lookup<Item>) -> String {
    let item = &found.best.entry.payload;
    let mut out = format!("**{}**", item.name);
    if let Some(rarity) = &item.rarity {
        let _ = write!(out, " ({rarity})");
    }
    if item.is_crafting() {
        out.push_str("\nUsed in crafting.");
    }
    let tags: Vec<&str> = item
        .gameplay_tags
        .iter()
        .map(String::as_str)
        .filter(|t| *t != crate::models::aoc::CRAFTING_TAG)
        .collect();
    if !tags.is_empty() {
        let _ = write!(out, "\nTags: {}", tags.join(", "));
    }
    out.push_str(&others_line(&found.others));
    out.push_str(freshness_note(&found.best));
    out
}

pub fn render_recipe(found: &Lookup<Recipe>, related: &[Related]) -> String {
    let recipe = &found.best.entry.payload;
    let mut out = format!("**{}**", recipe.name);

    if let Some(output) = related.iter().find(|r| r.link.relation == Relation::Output) {
        let _ = write!(out, "\nMakes: {}", child_name(output));
    }
    let ingredients: Vec<&Related> = related
        .iter()
        .filter(|r| r.link.relation == Relation::Ingredient)
        .collect();
    if !ingredients.is_empty() {
        out.push_str("\nIngredients:");
        for r in ingredients {
            let _ = write!(out, "\n- {} × {}", r.link.quantity.unwrap_or(1), child_name(r));
        }
    }
    out.push_str(&others_line(&found.others));
    out.push_str(freshness_note(&found.best));
    out
}

pub fn render_mob(found: &Lookup<Mob>, related: &[Related]) -> String {
    let mob = &found.best.entry.payload;
    let mut out = format!("**{}**", mob.name);
    if let Some(level) = mob.level {
        let _ = write!(out, " (level {level})");
    }

    for (relation, heading) in [(Relation::ItemDrop, "Drops"), (Relation::RecipeDrop, "Recipe drops")] {
        let drops: Vec<&Related> = related.iter().filter(|r| r.link.relation == relation).collect();
        if drops.is_empty() {
            continue;
        }
        let _ = write!(out, "\n{heading}:");
        for r in drops {
            let _ = write!(out, "\n- {} ({})", child_name(r), fmt_rate(r.link.drop_rate));
        }
    }
    out.push_str(&others_line(&found.others));
    out.push_str(freshness_note(&found.best));
    out
}

pub fn render_commodity(found: &Lookup<Commodity>) -> String {
    let c = &found.best.entry.payload;
    let mut out = format!("**{}**", c.name);
    if let Some(code) = &c.code {
        let _ = write!(out, " [{code}]");
    }
    if let Some(kind) = &c.kind {
        let _ = write!(out, "\nCategory: {kind}");
    }
    if c.is_illegal {
        out.push_str("\nIllegal cargo.");
    }
    match (c.price_buy, c.price_sell) {
        (None, None) => out.push_str("\nNo price data."),
        (buy, sell) => {
            if let Some(buy) = buy {
                let _ = write!(out, "\nBuy: {} / SCU", fmt_credits(buy));
            }
            if let Some(sell) = sell {
                let _ = write!(out, "\nSell: {} / SCU", fmt_credits(sell));
            }
        }
    }
    out.push_str(&others_line(&found.others));
    out.push_str(freshness_note(&found.best));
    out
}

pub fn render_vehicle(found: &Lookup<Vehicle>) -> String {
    let v = &found.best.entry.payload;
    let mut out = format!("**{}**", v.name_full.as_deref().unwrap_or(&v.name));
    if let Some(maker) = &v.manufacturer {
        let _ = write!(out, "\nManufacturer: {maker}");
    }
    if let Some(scu) = v.scu.filter(|s| *s > 0.0) {
        let _ = write!(out, "\nCargo: {scu} SCU");
    }
    if let Some(crew) = &v.crew {
        let _ = write!(out, "\nCrew: {}", crew.replace(',', "–"));
    }
    out.push_str(&others_line(&found.others));
    out.push_str(freshness_note(&found.best));
    out
}

pub fn render_server(found: &Lookup<ServerStatus>) -> String {
    let s = &found.best.entry.payload;
    let mut out = format!("**{}**: {}", s.name, if s.online { "online" } else { "offline" });
    if let Some(pop) = &s.population {
        let _ = write!(out, "\nPopulation: {pop}");
    }
    if let (Some(order), Some(destruction)) = (s.order_players, s.destruction_players) {
        let _ = write!(out, "\nOrder {order} / Destruction {destruction}");
    }
    out.push_str(freshness_note(&found.best));
    out
}

/// Look up an Ashes of Creation item
#[poise::command(slash_command)]
pub async fn item(
    ctx: Context<'_>,
    #[description = "Item name"]
    #[autocomplete = "autocomplete::item_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let outcome = simple_lookup(&ctx.data().app_state.caches.items, &name, render_item).await;
    respond(ctx, EntityKind::Item, &name, outcome).await
}

/// Look up an Ashes of Creation recipe and its ingredients
#[poise::command(slash_command)]
pub async fn recipe(
    ctx: Context<'_>,
    #[description = "Recipe name"]
    #[autocomplete = "autocomplete::recipe_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let cache = &ctx.data().app_state.caches.recipes;
    let outcome = match lookup_best(cache, &name).await {
        Ok(Some(found)) => cache
            .related(&found.best.entry.key)
            .await
            .map(|related| Some(render_recipe(&found, &related))),
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };
    respond(ctx, EntityKind::Recipe, &name, outcome).await
}

/// Look up an Ashes of Creation mob and its drops
#[poise::command(slash_command)]
pub async fn mob(
    ctx: Context<'_>,
    #[description = "Mob name"]
    #[autocomplete = "autocomplete::mob_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let cache = &ctx.data().app_state.caches.mobs;
    let outcome = match lookup_best(cache, &name).await {
        Ok(Some(found)) => cache
            .related(&found.best.entry.key)
            .await
            .map(|related| Some(render_mob(&found, &related))),
        Ok(None) => Ok(None),
        Err(e) => Err(e),
    };
    respond(ctx, EntityKind::Mob, &name, outcome).await
}

/// Star Citizen commodity prices
#[poise::command(slash_command)]
pub async fn commodity(
    ctx: Context<'_>,
    #[description = "Commodity name"]
    #[autocomplete = "autocomplete::commodity_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let outcome = simple_lookup(&ctx.data().app_state.caches.commodities, &name, render_commodity).await;
    respond(ctx, EntityKind::Commodity, &name, outcome).await
}

/// Star Citizen ship and vehicle details
#[poise::command(slash_command)]
pub async fn vehicle(
    ctx: Context<'_>,
    #[description = "Vehicle name"]
    #[autocomplete = "autocomplete::vehicle_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let outcome = simple_lookup(&ctx.data().app_state.caches.vehicles, &name, render_vehicle).await;
    respond(ctx, EntityKind::Vehicle, &name, outcome).await
}

/// Return of Reckoning realm status
#[poise::command(slash_command)]
pub async fn server(
    ctx: Context<'_>,
    #[description = "Realm name"]
    #[autocomplete = "autocomplete::server_names"]
    name: String,
) -> Result<(), Error> {
    ctx.defer().await?;
    let outcome = simple_lookup(&ctx.data().app_state.caches.servers, &name, render_server).await;
    respond(ctx, EntityKind::Server, &name, outcome).await
}

/// Show service health
#[poise::command(slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let state = &ctx.data().app_state;
    let mut out = format!(
        "Storage: {}",
        if state.db_pool.is_some() { "postgres" } else { "memory" }
    );
    for (name, status, since) in state.service_statuses.all() {
        let _ = write!(out, "\n{name}: {status:?} for {}", crate::utils::fmt_duration(since));
    }
    ctx.say(out).await?;
    Ok(())
}

/// Drop every cached entry of one kind
#[poise::command(slash_command, owners_only, ephemeral)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "Entity kind"]
    #[autocomplete = "autocomplete::entity_kinds"]
    kind: String,
) -> Result<(), Error> {
    let kind: EntityKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            ctx.say(e).await?;
            return Ok(());
        }
    };

    let reply = match ctx.data().app_state.caches.purge(kind).await {
        Ok(removed) => {
            info!(kind = %kind, removed, user = %ctx.author().name, "Cache purged");
            format!("Purged {removed} cached {kind} entries.")
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "Purge failed");
            describe_error(&e)
        }
    };
    ctx.say(reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, Freshness, Link, Match, RawEntry, Resolved, UpstreamError};
    use chrono::Utc;
    use std::time::Duration;

    fn lookup<T: Cacheable>(payload: T, freshness: Freshness) -> Lookup<T> {
        Lookup {
            best: Resolved {
                entry: CacheEntry::new(payload, Utc::now(), Duration::from_secs(60)),
                freshness,
            },
            others: Vec::new(),
        }
    }

    fn raw(kind: EntityKind, key: &str, name: &str) -> RawEntry {
        RawEntry {
            kind,
            key: key.into(),
            name: name.into(),
            payload: serde_json::Value::Null,
            cached_at: Utc::now(),
            links: Vec::new(),
        }
    }

    #[test]
    fn recipe_lists_output_and_ingredients() {
        let recipe = Recipe {
            guid: "r1".into(),
            name: "Forge Iron Sword".into(),
            output_item_guid: Some("sword".into()),
            ingredients: Vec::new(),
        };
        let related = vec![
            Related {
                link: Link::output("sword"),
                child: Some(raw(EntityKind::Item, "sword", "Iron Sword")),
            },
            Related {
                link: Link::ingredient("ingot", 3),
                child: None,
            },
        ];
        let text = render_recipe(&lookup(recipe, Freshness::Fresh), &related);
        assert!(text.contains("Makes: Iron Sword"), "{text}");
        assert!(text.contains("- 3 × `ingot`"), "{text}");
    }

    #[test]
    fn purged_output_is_shown_as_removed() {
        let recipe = Recipe {
            guid: "r1".into(),
            name: "Forge Iron Sword".into(),
            output_item_guid: None,
            ingredients: Vec::new(),
        };
        let mut link = Link::output("sword");
        link.child_key = None;
        let text = render_recipe(&lookup(recipe, Freshness::Fresh), &[Related { link, child: None }]);
        assert!(text.contains("Makes: (removed)"), "{text}");
    }

    #[test]
    fn stale_commodity_is_flagged() {
        let c = Commodity {
            id: 1,
            name: "Laranite".into(),
            code: Some("LARA".into()),
            kind: None,
            price_buy: None,
            price_sell: Some(2850.0),
            is_illegal: false,
        };
        let text = render_commodity(&lookup(c, Freshness::Stale(UpstreamError::timeout(Duration::from_secs(10)))));
        assert!(text.contains("Sell: 2,850 aUEC / SCU"), "{text}");
        assert!(text.contains("cached data"), "{text}");
    }

    #[test]
    fn runners_up_are_listed() {
        let v = Vehicle {
            id: 1,
            name: "Cutlass Black".into(),
            name_full: None,
            manufacturer: None,
            scu: None,
            crew: None,
        };
        let mut found = lookup(v.clone(), Freshness::Fresh);
        found.others.push(Match {
            entry: CacheEntry::new(
                Vehicle {
                    id: 2,
                    name: "Cutlass Red".into(),
                    ..v
                },
                Utc::now(),
                Duration::from_secs(60),
            ),
            score: 80,
        });
        assert!(render_vehicle(&found).contains("Also matched: Cutlass Red"));
    }
}
