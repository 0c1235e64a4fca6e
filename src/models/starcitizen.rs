//! Star Citizen entities as published by the UEX community API.

use serde::{Deserialize, Serialize};

use crate::cache::{Cacheable, EntityKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    /// Category such as `"Metal"` or `"Vice"`.
    pub kind: Option<String>,
    /// Average buy price in aUEC per SCU.
    #[serde(default)]
    pub price_buy: Option<f64>,
    /// Average sell price in aUEC per SCU.
    #[serde(default)]
    pub price_sell: Option<f64>,
    #[serde(default)]
    pub is_illegal: bool,
}

impl Cacheable for Commodity {
    const KIND: EntityKind = EntityKind::Commodity;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub name: String,
    pub name_full: Option<String>,
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub scu: Option<f64>,
    /// Crew range as published, e.g. `"1,4"`.
    #[serde(default)]
    pub crew: Option<String>,
}

impl Cacheable for Vehicle {
    const KIND: EntityKind = EntityKind::Vehicle;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
