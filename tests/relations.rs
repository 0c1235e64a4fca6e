//! Links between cached entities, and what happens to them when a partition is purged.

mod helpers;

use helpers::epoch;
use lorekeeper::cache::{
    CacheEntry, CacheError, CacheSettings, CacheStore, Clock, EntityCache, EntityKind, ManualClock, MemoryStore,
    Relation,
};
use lorekeeper::models::{Ingredient, Item, Recipe};
use lorekeeper::upstream::{Fetcher, Unconfigured};
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn item(guid: &str, name: &str) -> Item {
    Item {
        guid: guid.to_owned(),
        name: name.to_owned(),
        internal_name: None,
        gameplay_tags: Vec::new(),
        rarity: None,
    }
}

fn sword_recipe() -> Recipe {
    Recipe {
        guid: "r1".to_owned(),
        name: "Forge Iron Sword".to_owned(),
        output_item_guid: Some("sword".to_owned()),
        ingredients: vec![
            Ingredient {
                item_guid: "ingot".to_owned(),
                quantity: 3,
            },
            Ingredient {
                item_guid: "leather".to_owned(),
                quantity: 1,
            },
        ],
    }
}

struct Codex {
    store: Arc<MemoryStore>,
    items: EntityCache<Item>,
    recipes: EntityCache<Recipe>,
}

/// Item and recipe caches sharing one store, with no reachable upstream.
async fn codex() -> Codex {
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(epoch()));
    let settings = CacheSettings {
        ttl: DAY,
        ..CacheSettings::default()
    };

    let item_fetcher: Arc<dyn Fetcher<Item>> = Arc::new(Unconfigured { upstream: "codex" });
    let recipe_fetcher: Arc<dyn Fetcher<Recipe>> = Arc::new(Unconfigured { upstream: "codex" });
    let items = EntityCache::new(store.clone(), item_fetcher, clock.clone(), settings);
    let recipes = EntityCache::new(store.clone(), recipe_fetcher, clock, settings);

    for payload in [item("sword", "Iron Sword"), item("ingot", "Iron Ingot")] {
        let raw = CacheEntry::new(payload, epoch(), DAY).to_raw().unwrap();
        store.upsert(raw).await.unwrap();
    }
    let raw = CacheEntry::new(sword_recipe(), epoch(), DAY).to_raw().unwrap();
    store.upsert(raw).await.unwrap();

    Codex { store, items, recipes }
}

#[tokio::test]
async fn related_resolves_cached_children() {
    let codex = codex().await;

    let related = codex.recipes.related("r1").await.unwrap();

    assert_eq!(related.len(), 3);
    assert_eq!(related[0].link.relation, Relation::Output);
    assert_eq!(related[0].child.as_ref().map(|c| c.name.as_str()), Some("Iron Sword"));
    assert_eq!(related[1].link.quantity, Some(3));
    assert_eq!(related[1].child.as_ref().map(|c| c.name.as_str()), Some("Iron Ingot"));
    // Leather was never cached; the link survives without a child.
    assert_eq!(related[2].link.child_key.as_deref(), Some("leather"));
    assert!(related[2].child.is_none());
}

#[tokio::test]
async fn related_of_unknown_entry_is_empty() {
    let codex = codex().await;
    assert!(codex.recipes.related("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn purging_items_detaches_recipe_outputs() {
    let codex = codex().await;

    assert_eq!(codex.items.purge().await.unwrap(), 2);

    assert!(codex.store.get_all(EntityKind::Item).await.unwrap().is_empty());
    let related = codex.recipes.related("r1").await.unwrap();
    assert_eq!(related.len(), 3);
    assert_eq!(related[0].link.relation, Relation::Output);
    assert!(related[0].link.child_key.is_none());
    assert!(related.iter().all(|r| r.child.is_none()));

    // The recipe itself is untouched.
    let recipe = codex.recipes.get_by_key("r1").await.unwrap().unwrap();
    assert_eq!(recipe.entry.payload.ingredients.len(), 2);
}

#[tokio::test]
async fn unconfigured_upstream_fails_cleanly_on_miss() {
    let codex = codex().await;

    match codex.items.get_by_key("missing").await {
        Err(CacheError::RefreshFailed { kind, key, source }) => {
            assert_eq!(kind, EntityKind::Item);
            assert_eq!(key, "missing");
            assert!(source.message.contains("not configured"));
        }
        other => panic!("expected RefreshFailed, got {other:?}"),
    }
}
