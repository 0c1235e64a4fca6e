//! Postgres persistence: the cache tables and the `app_kv` state table.

pub mod cache;
pub mod kv;

pub use cache::PgCacheStore;
