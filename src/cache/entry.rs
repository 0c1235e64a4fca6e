//! Cache records and the trait every cached domain payload implements.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::StorageError;

/// Partition of the cache; keys are unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Item,
    Recipe,
    Mob,
    Commodity,
    Vehicle,
    Server,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Item,
        EntityKind::Recipe,
        EntityKind::Mob,
        EntityKind::Commodity,
        EntityKind::Vehicle,
        EntityKind::Server,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Recipe => "recipe",
            EntityKind::Mob => "mob",
            EntityKind::Commodity => "commodity",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Server => "server",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

/// How a child record hangs off its parent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Recipe → item consumed by the recipe.
    Ingredient,
    /// Recipe → item produced. Nulled when that item is purged.
    Output,
    /// Mob → item it can drop.
    ItemDrop,
    /// Mob → recipe it can drop.
    RecipeDrop,
}

impl Relation {
    /// Kind of the entry the link's `child_key` points into.
    pub fn child_kind(self) -> EntityKind {
        match self {
            Relation::Ingredient | Relation::Output | Relation::ItemDrop => EntityKind::Item,
            Relation::RecipeDrop => EntityKind::Recipe,
        }
    }
}

/// A foreign-key style reference from a parent entry to another entry by key.
///
/// `child_key` is `None` only for an output link whose item has been purged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub relation: Relation,
    pub child_key: Option<String>,
    pub quantity: Option<i32>,
    pub drop_rate: Option<f32>,
}

impl Link {
    pub fn ingredient(item_key: impl Into<String>, quantity: i32) -> Self {
        Self {
            relation: Relation::Ingredient,
            child_key: Some(item_key.into()),
            quantity: Some(quantity),
            drop_rate: None,
        }
    }

    pub fn output(item_key: impl Into<String>) -> Self {
        Self {
            relation: Relation::Output,
            child_key: Some(item_key.into()),
            quantity: None,
            drop_rate: None,
        }
    }

    pub fn drop(relation: Relation, child_key: impl Into<String>, drop_rate: Option<f32>) -> Self {
        Self {
            relation,
            child_key: Some(child_key.into()),
            quantity: None,
            drop_rate,
        }
    }
}

/// A domain value that can live in the cache.
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Stable upstream identifier.
    fn key(&self) -> String;

    /// Display name used for fuzzy matching.
    fn name(&self) -> &str;

    /// Outgoing references to other cached entries.
    fn links(&self) -> Vec<Link> {
        Vec::new()
    }
}

/// Type-erased row as the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub kind: EntityKind,
    pub key: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub cached_at: DateTime<Utc>,
    pub links: Vec<Link>,
}

/// A fetched payload together with when it was cached and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T: Cacheable> CacheEntry<T> {
    pub fn new(payload: T, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: payload.key(),
            payload,
            cached_at,
            ttl,
        }
    }

    pub fn name(&self) -> &str {
        self.payload.name()
    }

    /// Fresh while `now - cached_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return true;
        };
        now - self.cached_at < ttl
    }

    pub fn to_raw(&self) -> Result<RawEntry, StorageError> {
        let payload = serde_json::to_value(&self.payload)
            .map_err(|e| StorageError::new("serialize", format!("{} `{}`: {e}", T::KIND, self.key)))?;
        Ok(RawEntry {
            kind: T::KIND,
            key: self.key.clone(),
            name: self.payload.name().to_owned(),
            payload,
            cached_at: self.cached_at,
            links: self.payload.links(),
        })
    }

    pub fn from_raw(raw: RawEntry, ttl: Duration) -> Result<Self, StorageError> {
        let payload: T = serde_json::from_value(raw.payload)
            .map_err(|e| StorageError::new("deserialize", format!("{} `{}`: {e}", raw.kind, raw.key)))?;
        Ok(Self {
            key: raw.key,
            payload,
            cached_at: raw.cached_at,
            ttl,
        })
    }
}
