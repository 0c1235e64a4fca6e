//! Error taxonomy for the cache layer.
//!
//! Every error here is `Clone`: a single upstream fetch outcome is fanned out
//! to all callers coalesced onto it.

use std::fmt;

use super::entry::EntityKind;

/// The persistence layer failed or rejected a write.
#[derive(Debug, Clone, thiserror::Error)]
#[error("storage {operation} failed: {message}")]
pub struct StorageError {
    pub operation: &'static str,
    pub message: String,
}

impl StorageError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Upstream API unreachable, non-2xx, timed out, or returned something unparseable.
#[derive(Debug, Clone)]
pub struct UpstreamError {
    /// HTTP status when the upstream answered; `None` for transport failures.
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(Some(404), format!("{what} not found"))
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(None, format!("timed out after {after:?}"))
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(None, format!("malformed response: {}", message.into()))
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream request failed ({status}): {}", self.message),
            None => write!(f, "upstream request failed: {}", self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

/// Errors surfaced to the command layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Refresh failed and there was no stale entry to fall back to.
    #[error("could not refresh {kind} `{key}`: {source}")]
    RefreshFailed {
        kind: EntityKind,
        key: String,
        #[source]
        source: UpstreamError,
    },
}
