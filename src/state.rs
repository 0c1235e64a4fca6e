//! Application state shared across components (bot, warmer).

use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheError, EntityCache, EntityKind, WarmTarget};
use crate::models::{Commodity, Item, Mob, Recipe, ServerStatus, Vehicle};

/// Health status of a service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceStatus {
    Starting,
    Active,
    Connected,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status.clone())
    }

    /// Snapshot of every service with how long it has held its current status.
    pub fn all(&self) -> Vec<(String, ServiceStatus, std::time::Duration)> {
        let mut all: Vec<_> = self
            .inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status.clone(),
                    entry.value().updated_at.elapsed(),
                )
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// One cache per entity kind.
#[derive(Clone)]
pub struct Caches {
    pub items: Arc<EntityCache<Item>>,
    pub recipes: Arc<EntityCache<Recipe>>,
    pub mobs: Arc<EntityCache<Mob>>,
    pub commodities: Arc<EntityCache<Commodity>>,
    pub vehicles: Arc<EntityCache<Vehicle>>,
    pub servers: Arc<EntityCache<ServerStatus>>,
}

impl Caches {
    /// Warmers for every kind, in `EntityKind::ALL` order.
    pub fn warm_targets(&self) -> Vec<Arc<dyn WarmTarget>> {
        vec![
            self.items.warmer(),
            self.recipes.warmer(),
            self.mobs.warmer(),
            self.commodities.warmer(),
            self.vehicles.warmer(),
            self.servers.warmer(),
        ]
    }

    pub async fn purge(&self, kind: EntityKind) -> Result<u64, CacheError> {
        match kind {
            EntityKind::Item => self.items.purge().await,
            EntityKind::Recipe => self.recipes.purge().await,
            EntityKind::Mob => self.mobs.purge().await,
            EntityKind::Commodity => self.commodities.purge().await,
            EntityKind::Vehicle => self.vehicles.purge().await,
            EntityKind::Server => self.servers.purge().await,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub caches: Caches,
    /// `None` when running on the in-memory store.
    pub db_pool: Option<PgPool>,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    pub fn new(caches: Caches, db_pool: Option<PgPool>) -> Self {
        Self {
            caches,
            db_pool,
            service_statuses: ServiceStatusRegistry::new(),
        }
    }
}
