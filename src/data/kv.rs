//! Small string settings in the UNLOGGED `app_kv` table.
//!
//! Holds the warmer's last-complete timestamps and the registered bot command
//! fingerprint. Losing the table after a crash only costs an early re-warm and
//! a re-registration.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;

use crate::cache::EntityKind;

/// Fingerprint of the command set last registered with Discord.
pub const COMMANDS_FINGERPRINT: &str = "bot.commands_fingerprint";

const WARM_PREFIX: &str = "warmer.";

/// Key holding the last complete warm of `kind`.
pub fn warm_key(kind: EntityKind) -> String {
    format!("{WARM_PREFIX}{kind}")
}

pub async fn get(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT value FROM app_kv WHERE key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn set(pool: &PgPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO app_kv (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Every persisted warm timestamp, keyed by entity kind name.
///
/// Rows whose value is not RFC 3339 are skipped.
pub async fn warm_timestamps(pool: &PgPool) -> Result<HashMap<String, DateTime<Utc>>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM app_kv WHERE starts_with(key, $1)")
        .bind(WARM_PREFIX)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(key, value)| {
            let kind = key.strip_prefix(WARM_PREFIX)?.to_owned();
            match DateTime::parse_from_rfc3339(&value) {
                Ok(ts) => Some((kind, ts.to_utc())),
                Err(e) => {
                    debug!(key, value, error = %e, "Ignoring unparseable warm timestamp");
                    None
                }
            }
        })
        .collect())
}

pub async fn set_warm_timestamp(pool: &PgPool, kind: EntityKind, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    set(pool, &warm_key(kind), &at.to_rfc3339()).await
}
