//! Return of Reckoning realm status.

use serde::{Deserialize, Serialize};

use crate::cache::{Cacheable, EntityKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub online: bool,
    /// Population label as shown on the launcher (`"Low"`, `"High"`, ...).
    pub population: Option<String>,
    pub order_players: Option<u32>,
    pub destruction_players: Option<u32>,
}

impl Cacheable for ServerStatus {
    const KIND: EntityKind = EntityKind::Server;

    fn key(&self) -> String {
        self.name.to_lowercase()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
