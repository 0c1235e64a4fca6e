//! Key-value persistence over cache entries.
//!
//! Implementations must tolerate concurrent readers and writers to distinct
//! keys. Same-key write races are the refresh coordinator's problem; a store
//! only has to make each individual upsert/delete atomic.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::entry::{EntityKind, Link, RawEntry, Relation};
use super::error::StorageError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<RawEntry>, StorageError>;

    /// All entries of one kind, in no particular order.
    async fn get_all(&self, kind: EntityKind) -> Result<Vec<RawEntry>, StorageError>;

    /// Insert or replace by `(kind, key)`. `cached_at` never moves backwards.
    async fn upsert(&self, entry: RawEntry) -> Result<(), StorageError>;

    /// Returns whether an entry was removed.
    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool, StorageError>;

    /// Returns the number of entries removed.
    async fn delete_all(&self, kind: EntityKind) -> Result<u64, StorageError>;

    /// Outgoing links of one entry; empty when the entry is absent.
    async fn links(&self, kind: EntityKind, key: &str) -> Result<Vec<Link>, StorageError>;
}

/// Process-local store backed by a sharded concurrent map.
///
/// Used when no database is configured, and throughout the tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(EntityKind, String), RawEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Null out recipe outputs that pointed at a now-deleted item.
    fn detach_outputs(&self, item_keys: &[String]) {
        for mut entry in self.entries.iter_mut() {
            if entry.key().0 != EntityKind::Recipe {
                continue;
            }
            for link in entry.value_mut().links.iter_mut() {
                if link.relation == Relation::Output
                    && link
                        .child_key
                        .as_ref()
                        .is_some_and(|k| item_keys.contains(k))
                {
                    link.child_key = None;
                }
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Option<RawEntry>, StorageError> {
        Ok(self
            .entries
            .get(&(kind, key.to_owned()))
            .map(|e| e.value().clone()))
    }

    async fn get_all(&self, kind: EntityKind) -> Result<Vec<RawEntry>, StorageError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn upsert(&self, mut entry: RawEntry) -> Result<(), StorageError> {
        match self.entries.entry((entry.kind, entry.key.clone())) {
            Entry::Occupied(mut occupied) => {
                entry.cached_at = entry.cached_at.max(occupied.get().cached_at);
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool, StorageError> {
        let removed = self.entries.remove(&(kind, key.to_owned())).is_some();
        if removed && kind == EntityKind::Item {
            self.detach_outputs(&[key.to_owned()]);
        }
        Ok(removed)
    }

    async fn delete_all(&self, kind: EntityKind) -> Result<u64, StorageError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.key().1.clone())
            .collect();

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if self.entries.remove(&(kind, key.clone())).is_some() {
                removed.push(key);
            }
        }
        if kind == EntityKind::Item && !removed.is_empty() {
            self.detach_outputs(&removed);
        }
        Ok(removed.len() as u64)
    }

    async fn links(&self, kind: EntityKind, key: &str) -> Result<Vec<Link>, StorageError> {
        Ok(self
            .entries
            .get(&(kind, key.to_owned()))
            .map(|e| e.links.clone())
            .unwrap_or_default())
    }
}
