//! Postgres-backed cache store.
//!
//! Entries live in `cache_entries` keyed by `(kind, key)`. Links are split
//! across one table per relation, each cascading from its parent entry. Child
//! keys are not foreign keys since children are cached independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::{CacheStore, EntityKind, Link, RawEntry, Relation, StorageError};
use crate::utils::log_if_slow;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);

fn failed(operation: &'static str) -> impl Fn(sqlx::Error) -> StorageError {
    move |e| StorageError::new(operation, e.to_string())
}

pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_entry(row: &sqlx::postgres::PgRow) -> Result<RawEntry, StorageError> {
    let kind: String = row.try_get("kind").map_err(failed("decode"))?;
    let kind = kind
        .parse::<EntityKind>()
        .map_err(|e| StorageError::new("decode", e))?;
    Ok(RawEntry {
        kind,
        key: row.try_get("key").map_err(failed("decode"))?,
        name: row.try_get("name").map_err(failed("decode"))?,
        payload: row.try_get("payload").map_err(failed("decode"))?,
        cached_at: row.try_get::<DateTime<Utc>, _>("cached_at").map_err(failed("decode"))?,
        links: Vec::new(),
    })
}

/// Links of every `kind` entry (or only `keys`, when given), grouped by parent key
/// in insertion order: outputs before ingredients, item drops before recipe drops.
async fn load_links(
    pool: &PgPool,
    kind: EntityKind,
    keys: Option<&[String]>,
) -> Result<HashMap<String, Vec<Link>>, StorageError> {
    let mut links: HashMap<String, Vec<Link>> = HashMap::new();
    let keys: Option<Vec<String>> = keys.map(<[String]>::to_vec);

    match kind {
        EntityKind::Recipe => {
            let outputs = sqlx::query(
                "SELECT recipe_key, output_item_key FROM recipe_outputs
                 WHERE $1::text[] IS NULL OR recipe_key = ANY($1)",
            )
            .bind(&keys)
            .fetch_all(pool)
            .await
            .map_err(failed("links"))?;
            for row in outputs {
                let parent: String = row.try_get("recipe_key").map_err(failed("decode"))?;
                let child: Option<String> = row.try_get("output_item_key").map_err(failed("decode"))?;
                links.entry(parent).or_default().push(Link {
                    relation: Relation::Output,
                    child_key: child,
                    quantity: None,
                    drop_rate: None,
                });
            }

            let ingredients = sqlx::query(
                "SELECT recipe_key, item_key, quantity FROM recipe_ingredients
                 WHERE $1::text[] IS NULL OR recipe_key = ANY($1)
                 ORDER BY recipe_key, position",
            )
            .bind(&keys)
            .fetch_all(pool)
            .await
            .map_err(failed("links"))?;
            for row in ingredients {
                let parent: String = row.try_get("recipe_key").map_err(failed("decode"))?;
                let item: String = row.try_get("item_key").map_err(failed("decode"))?;
                let quantity: i32 = row.try_get("quantity").map_err(failed("decode"))?;
                links
                    .entry(parent)
                    .or_default()
                    .push(Link::ingredient(item, quantity));
            }
        }
        EntityKind::Mob => {
            for (relation, table, child_col) in [
                (Relation::ItemDrop, "mob_item_drops", "item_key"),
                (Relation::RecipeDrop, "mob_recipe_drops", "recipe_key"),
            ] {
                let sql = format!(
                    "SELECT mob_key, {child_col} AS child_key, drop_rate FROM {table}
                     WHERE $1::text[] IS NULL OR mob_key = ANY($1)
                     ORDER BY mob_key, position"
                );
                let rows = sqlx::query(&sql)
                    .bind(&keys)
                    .fetch_all(pool)
                    .await
                    .map_err(failed("links"))?;
                for row in rows {
                    let parent: String = row.try_get("mob_key").map_err(failed("decode"))?;
                    let child: String = row.try_get("child_key").map_err(failed("decode"))?;
                    let rate: Option<f32> = row.try_get("drop_rate").map_err(failed("decode"))?;
                    links
                        .entry(parent)
                        .or_default()
                        .push(Link::drop(relation, child, rate));
                }
            }
        }
        _ => {}
    }

    Ok(links)
}

/// Replace the stored links of one parent entry.
async fn replace_links(conn: &mut PgConnection, entry: &RawEntry) -> Result<(), StorageError> {
    match entry.kind {
        EntityKind::Recipe => {
            sqlx::query("DELETE FROM recipe_outputs WHERE recipe_key = $1")
                .bind(&entry.key)
                .execute(&mut *conn)
                .await
                .map_err(failed("upsert"))?;
            sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_key = $1")
                .bind(&entry.key)
                .execute(&mut *conn)
                .await
                .map_err(failed("upsert"))?;

            if let Some(output) = entry.links.iter().find(|l| l.relation == Relation::Output) {
                sqlx::query("INSERT INTO recipe_outputs (recipe_key, output_item_key) VALUES ($1, $2)")
                    .bind(&entry.key)
                    .bind(&output.child_key)
                    .execute(&mut *conn)
                    .await
                    .map_err(failed("upsert"))?;
            }

            let (items, quantities): (Vec<&str>, Vec<i32>) = entry
                .links
                .iter()
                .filter(|l| l.relation == Relation::Ingredient)
                .filter_map(|l| Some((l.child_key.as_deref()?, l.quantity.unwrap_or(1))))
                .unzip();
            if !items.is_empty() {
                let positions: Vec<i32> = (0..items.len() as i32).collect();
                sqlx::query(
                    r#"
                    INSERT INTO recipe_ingredients (recipe_key, item_key, quantity, position)
                    SELECT $1, v.item_key, v.quantity, v.position
                    FROM UNNEST($2::text[], $3::int4[], $4::int4[]) AS v(item_key, quantity, position)
                    ON CONFLICT (recipe_key, item_key) DO NOTHING
                    "#,
                )
                .bind(&entry.key)
                .bind(&items)
                .bind(&quantities)
                .bind(&positions)
                .execute(&mut *conn)
                .await
                .map_err(failed("upsert"))?;
            }
        }
        EntityKind::Mob => {
            for (relation, table, child_col) in [
                (Relation::ItemDrop, "mob_item_drops", "item_key"),
                (Relation::RecipeDrop, "mob_recipe_drops", "recipe_key"),
            ] {
                sqlx::query(&format!("DELETE FROM {table} WHERE mob_key = $1"))
                    .bind(&entry.key)
                    .execute(&mut *conn)
                    .await
                    .map_err(failed("upsert"))?;

                let (children, rates): (Vec<&str>, Vec<Option<f32>>) = entry
                    .links
                    .iter()
                    .filter(|l| l.relation == relation)
                    .filter_map(|l| Some((l.child_key.as_deref()?, l.drop_rate)))
                    .unzip();
                if children.is_empty() {
                    continue;
                }
                let positions: Vec<i32> = (0..children.len() as i32).collect();
                let sql = format!(
                    "INSERT INTO {table} (mob_key, {child_col}, drop_rate, position)
                     SELECT $1, v.child_key, v.drop_rate, v.position
                     FROM UNNEST($2::text[], $3::real[], $4::int4[]) AS v(child_key, drop_rate, position)
                     ON CONFLICT DO NOTHING"
                );
                sqlx::query(&sql)
                    .bind(&entry.key)
                    .bind(&children)
                    .bind(&rates)
                    .bind(&positions)
                    .execute(&mut *conn)
                    .await
                    .map_err(failed("upsert"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<RawEntry>, StorageError> {
        let row = sqlx::query(
            "SELECT kind, key, name, payload, cached_at FROM cache_entries WHERE kind = $1 AND key = $2",
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(failed("get"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut entry = decode_entry(&row)?;
        entry.links = load_links(&self.pool, kind, Some(&[entry.key.clone()]))
            .await?
            .remove(&entry.key)
            .unwrap_or_default();
        Ok(Some(entry))
    }

    async fn get_all(&self, kind: EntityKind) -> Result<Vec<RawEntry>, StorageError> {
        let start = Instant::now();
        let rows = sqlx::query("SELECT kind, key, name, payload, cached_at FROM cache_entries WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(failed("get_all"))?;

        let mut links = load_links(&self.pool, kind, None).await?;
        let entries = rows
            .iter()
            .map(|row| {
                let mut entry = decode_entry(row)?;
                entry.links = links.remove(&entry.key).unwrap_or_default();
                Ok(entry)
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        log_if_slow(start, SLOW_QUERY_THRESHOLD, "cache get_all");
        debug!(kind = %kind, count = entries.len(), "Loaded cache partition");
        Ok(entries)
    }

    async fn upsert(&self, entry: RawEntry) -> Result<(), StorageError> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(failed("upsert"))?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (kind, key, name, payload, cached_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (kind, key) DO UPDATE SET
                name = EXCLUDED.name,
                payload = EXCLUDED.payload,
                cached_at = GREATEST(cache_entries.cached_at, EXCLUDED.cached_at)
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(&entry.key)
        .bind(&entry.name)
        .bind(&entry.payload)
        .bind(entry.cached_at)
        .execute(&mut *tx)
        .await
        .map_err(failed("upsert"))?;

        replace_links(&mut *tx, &entry).await?;
        tx.commit().await.map_err(failed("upsert"))?;

        log_if_slow(start, SLOW_QUERY_THRESHOLD, "cache upsert");
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(failed("delete"))?;

        let removed = sqlx::query("DELETE FROM cache_entries WHERE kind = $1 AND key = $2")
            .bind(kind.as_str())
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(failed("delete"))?
            .rows_affected()
            > 0;

        if removed && kind == EntityKind::Item {
            sqlx::query("UPDATE recipe_outputs SET output_item_key = NULL WHERE output_item_key = $1")
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(failed("delete"))?;
        }

        tx.commit().await.map_err(failed("delete"))?;
        Ok(removed)
    }

    async fn delete_all(&self, kind: EntityKind) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(failed("delete_all"))?;

        if kind == EntityKind::Item {
            sqlx::query(
                r#"
                UPDATE recipe_outputs SET output_item_key = NULL
                WHERE output_item_key IN (SELECT key FROM cache_entries WHERE kind = 'item')
                "#,
            )
            .execute(&mut *tx)
            .await
            .map_err(failed("delete_all"))?;
        }

        let removed = sqlx::query("DELETE FROM cache_entries WHERE kind = $1")
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(failed("delete_all"))?
            .rows_affected();

        tx.commit().await.map_err(failed("delete_all"))?;
        debug!(kind = %kind, removed, "Purged cache partition");
        Ok(removed)
    }

    async fn links(&self, kind: EntityKind, key: &str) -> Result<Vec<Link>, StorageError> {
        Ok(load_links(&self.pool, kind, Some(&[key.to_owned()]))
            .await?
            .remove(key)
            .unwrap_or_default())
    }
}
