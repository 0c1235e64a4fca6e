//! Postgres cache store and `app_kv` behaviour against the real schema.

mod helpers;

use chrono::Duration as ChronoDuration;
use helpers::epoch;
use lorekeeper::cache::{CacheEntry, CacheStore, Cacheable, EntityKind, Link, RawEntry, Relation};
use lorekeeper::data::{PgCacheStore, kv};
use lorekeeper::models::{Ingredient, Item, Mob, MobDrop, Recipe};
use sqlx::PgPool;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn raw<T: Cacheable>(payload: T) -> RawEntry {
    CacheEntry::new(payload, epoch(), DAY).to_raw().unwrap()
}

fn item(guid: &str, name: &str) -> Item {
    Item {
        guid: guid.to_owned(),
        name: name.to_owned(),
        internal_name: None,
        gameplay_tags: vec!["Artisanship.Crafting".to_owned()],
        rarity: Some("Common".to_owned()),
    }
}

fn ingredient(item_guid: &str, quantity: i32) -> Ingredient {
    Ingredient {
        item_guid: item_guid.to_owned(),
        quantity,
    }
}

fn recipe(guid: &str, output: Option<&str>, ingredients: Vec<Ingredient>) -> Recipe {
    Recipe {
        guid: guid.to_owned(),
        name: format!("Recipe {guid}"),
        output_item_guid: output.map(str::to_owned),
        ingredients,
    }
}

/// Insert two items and a recipe that outputs the sword from ingots and leather.
async fn insert_forge(store: &PgCacheStore) {
    store.upsert(raw(item("sword", "Iron Sword"))).await.unwrap();
    store.upsert(raw(item("ingot", "Iron Ingot"))).await.unwrap();
    let sword = recipe("r1", Some("sword"), vec![ingredient("ingot", 3), ingredient("leather", 1)]);
    store.upsert(raw(sword)).await.unwrap();
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}

#[sqlx::test]
async fn upsert_then_get_round_trips_payload_and_links(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    insert_forge(&store).await;

    let got = store.get(EntityKind::Recipe, "r1").await.unwrap().unwrap();
    assert_eq!(got.name, "Recipe r1");
    assert_eq!(got.cached_at, epoch());
    assert_eq!(
        got.links,
        vec![
            Link::output("sword"),
            Link::ingredient("ingot", 3),
            Link::ingredient("leather", 1)
        ]
    );

    let decoded = CacheEntry::<Recipe>::from_raw(got, DAY).unwrap();
    assert_eq!(decoded.payload.ingredients.len(), 2);

    let sword = store.get(EntityKind::Item, "sword").await.unwrap().unwrap();
    assert!(sword.links.is_empty());
    assert!(store.get(EntityKind::Mob, "sword").await.unwrap().is_none());
}

#[sqlx::test]
async fn duplicate_ingredient_keeps_first_line(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    let doubled = recipe("r2", None, vec![ingredient("ingot", 2), ingredient("ingot", 5)]);
    store.upsert(raw(doubled)).await.unwrap();

    let links = store.links(EntityKind::Recipe, "r2").await.unwrap();
    assert_eq!(links, vec![Link::ingredient("ingot", 2)]);
}

#[sqlx::test]
async fn reupsert_replaces_links(pool: PgPool) {
    let store = PgCacheStore::new(pool.clone());
    insert_forge(&store).await;

    let reworked = recipe("r1", None, vec![ingredient("steel", 2)]);
    store.upsert(raw(reworked)).await.unwrap();

    let links = store.links(EntityKind::Recipe, "r1").await.unwrap();
    assert_eq!(links, vec![Link::ingredient("steel", 2)]);
    assert_eq!(
        count(&pool, "SELECT count(*) FROM recipe_outputs WHERE recipe_key = 'r1'").await,
        0
    );
}

#[sqlx::test]
async fn cached_at_never_moves_backwards(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    store.upsert(raw(item("sword", "Iron Sword"))).await.unwrap();

    let mut older = raw(item("sword", "Iron Sword (renamed)"));
    older.cached_at = epoch() - ChronoDuration::hours(3);
    store.upsert(older).await.unwrap();

    let got = store.get(EntityKind::Item, "sword").await.unwrap().unwrap();
    assert_eq!(got.cached_at, epoch());
    assert_eq!(got.name, "Iron Sword (renamed)");

    let mut newer = raw(item("sword", "Iron Sword"));
    newer.cached_at = epoch() + ChronoDuration::hours(1);
    store.upsert(newer).await.unwrap();
    let got = store.get(EntityKind::Item, "sword").await.unwrap().unwrap();
    assert_eq!(got.cached_at, epoch() + ChronoDuration::hours(1));
}

#[sqlx::test]
async fn deleting_a_parent_cascades_to_its_links(pool: PgPool) {
    let store = PgCacheStore::new(pool.clone());
    insert_forge(&store).await;
    let goblin = Mob {
        guid: "m1".to_owned(),
        name: "Goblin Scout".to_owned(),
        level: Some(12),
        item_drops: vec![MobDrop {
            guid: "ingot".to_owned(),
            drop_rate: Some(0.25),
        }],
        recipe_drops: vec![MobDrop {
            guid: "r1".to_owned(),
            drop_rate: None,
        }],
    };
    store.upsert(raw(goblin)).await.unwrap();

    let mob_links = store.links(EntityKind::Mob, "m1").await.unwrap();
    assert_eq!(
        mob_links,
        vec![
            Link::drop(Relation::ItemDrop, "ingot", Some(0.25)),
            Link::drop(Relation::RecipeDrop, "r1", None)
        ]
    );

    assert!(store.delete(EntityKind::Recipe, "r1").await.unwrap());
    assert!(!store.delete(EntityKind::Recipe, "r1").await.unwrap());
    assert_eq!(count(&pool, "SELECT count(*) FROM recipe_ingredients").await, 0);
    assert_eq!(count(&pool, "SELECT count(*) FROM recipe_outputs").await, 0);

    assert_eq!(store.delete_all(EntityKind::Mob).await.unwrap(), 1);
    assert_eq!(count(&pool, "SELECT count(*) FROM mob_item_drops").await, 0);
    assert_eq!(count(&pool, "SELECT count(*) FROM mob_recipe_drops").await, 0);

    // Children are soft references and survive their parents.
    assert!(store.get(EntityKind::Item, "ingot").await.unwrap().is_some());
}

#[sqlx::test]
async fn deleting_an_item_nulls_recipe_outputs(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    insert_forge(&store).await;

    assert!(store.delete(EntityKind::Item, "sword").await.unwrap());

    let links = store.links(EntityKind::Recipe, "r1").await.unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links[0].relation, Relation::Output);
    assert_eq!(links[0].child_key, None);
    assert_eq!(links[1], Link::ingredient("ingot", 3));
}

#[sqlx::test]
async fn purging_items_nulls_outputs_and_keeps_recipes(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    insert_forge(&store).await;
    store
        .upsert(raw(recipe("r2", Some("ingot"), vec![ingredient("ore", 2)])))
        .await
        .unwrap();

    assert_eq!(store.delete_all(EntityKind::Item).await.unwrap(), 2);

    assert!(store.get_all(EntityKind::Item).await.unwrap().is_empty());
    let recipes = store.get_all(EntityKind::Recipe).await.unwrap();
    assert_eq!(recipes.len(), 2);
    for recipe in &recipes {
        let output = recipe
            .links
            .iter()
            .find(|l| l.relation == Relation::Output)
            .unwrap();
        assert_eq!(output.child_key, None, "recipe {}", recipe.key);
    }
}

#[sqlx::test]
async fn get_all_attaches_links_per_entry(pool: PgPool) {
    let store = PgCacheStore::new(pool);
    insert_forge(&store).await;
    store
        .upsert(raw(recipe("r2", None, vec![ingredient("ore", 4)])))
        .await
        .unwrap();

    let mut recipes = store.get_all(EntityKind::Recipe).await.unwrap();
    recipes.sort_by(|a, b| a.key.cmp(&b.key));

    assert_eq!(recipes[0].key, "r1");
    assert_eq!(recipes[0].links.len(), 3);
    assert_eq!(recipes[1].links, vec![Link::ingredient("ore", 4)]);
    assert_eq!(store.get_all(EntityKind::Item).await.unwrap().len(), 2);
    assert!(store.get_all(EntityKind::Vehicle).await.unwrap().is_empty());
}

#[sqlx::test]
async fn warm_timestamps_round_trip(pool: PgPool) {
    kv::set_warm_timestamp(&pool, EntityKind::Item, epoch()).await.unwrap();
    kv::set_warm_timestamp(&pool, EntityKind::Server, epoch() - ChronoDuration::minutes(2))
        .await
        .unwrap();
    // Overwrites keep the latest value.
    kv::set_warm_timestamp(&pool, EntityKind::Item, epoch() + ChronoDuration::hours(1))
        .await
        .unwrap();
    kv::set(&pool, &kv::warm_key(EntityKind::Mob), "not a timestamp")
        .await
        .unwrap();
    kv::set(&pool, kv::COMMANDS_FINGERPRINT, "item:(query)").await.unwrap();

    let stamps = kv::warm_timestamps(&pool).await.unwrap();

    assert_eq!(stamps.len(), 2);
    assert_eq!(stamps["item"], epoch() + ChronoDuration::hours(1));
    assert_eq!(stamps["server"], epoch() - ChronoDuration::minutes(2));
    assert_eq!(
        kv::get(&pool, kv::COMMANDS_FINGERPRINT).await.unwrap().as_deref(),
        Some("item:(query)")
    );
    assert!(kv::get(&pool, "missing").await.unwrap().is_none());
}
