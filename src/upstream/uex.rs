//! UEX community API (Star Citizen commodity prices and ship data).
//!
//! Responses are wrapped in a `{status, data}` envelope. Listings are returned in
//! full, so paging always stops after the first page and single-entity lookups
//! filter the listing by id.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::trace;

use super::{Fetcher, HttpClient, Page, endpoint};
use crate::cache::{Cacheable, UpstreamError};
use crate::models::{Commodity, Vehicle};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// UEX flags booleans as `0`/`1`.
fn int_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Option::<Flag>::deserialize(d)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(i)) => i != 0,
        None => false,
    })
}

#[derive(Debug, Deserialize)]
pub struct UexCommodity {
    id: i64,
    name: String,
    code: Option<String>,
    kind: Option<String>,
    price_buy: Option<f64>,
    price_sell: Option<f64>,
    #[serde(default, deserialize_with = "int_bool")]
    is_illegal: bool,
}

impl From<UexCommodity> for Commodity {
    fn from(c: UexCommodity) -> Self {
        Self {
            id: c.id,
            name: c.name,
            code: c.code,
            kind: c.kind,
            // UEX reports 0 for "no data"
            price_buy: c.price_buy.filter(|p| *p > 0.0),
            price_sell: c.price_sell.filter(|p| *p > 0.0),
            is_illegal: c.is_illegal,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UexVehicle {
    id: i64,
    name: String,
    name_full: Option<String>,
    company_name: Option<String>,
    scu: Option<f64>,
    crew: Option<String>,
}

impl From<UexVehicle> for Vehicle {
    fn from(v: UexVehicle) -> Self {
        Self {
            id: v.id,
            name: v.name,
            name_full: v.name_full,
            manufacturer: v.company_name,
            scu: v.scu,
            crew: v.crew.filter(|c| !c.is_empty()),
        }
    }
}

/// A UEX listing endpoint and its wire type.
pub trait UexResource: Cacheable {
    const PATH: &'static str;
    type Wire: DeserializeOwned + Into<Self> + Send;
}

impl UexResource for Commodity {
    const PATH: &'static str = "commodities";
    type Wire = UexCommodity;
}

impl UexResource for Vehicle {
    const PATH: &'static str = "vehicles";
    type Wire = UexVehicle;
}

pub struct UexClient {
    http: HttpClient,
    base_url: String,
}

impl UexClient {
    pub fn new(http: HttpClient, base_url: String) -> Self {
        Self { http, base_url }
    }

    async fn list<T: UexResource>(&self) -> Result<Vec<T>, UpstreamError> {
        let url = endpoint(&self.base_url, T::PATH)?;
        let envelope: Envelope<T::Wire> = self.http.get_json(self.http.get(url)).await?;
        if envelope.status != "ok" {
            return Err(UpstreamError::malformed(format!(
                "uex {} returned status `{}`",
                T::PATH,
                envelope.status
            )));
        }
        trace!(path = T::PATH, count = envelope.data.len(), "Fetched UEX listing");
        Ok(envelope.data.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl<T: UexResource> Fetcher<T> for UexClient {
    async fn fetch_one(&self, key: &str) -> Result<T, UpstreamError> {
        self.list::<T>()
            .await?
            .into_iter()
            .find(|entity| entity.key() == key)
            .ok_or_else(|| UpstreamError::not_found(format!("uex {} `{key}`", T::PATH)))
    }

    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<Page<T>, UpstreamError> {
        Ok(Page::last(self.list::<T>().await?))
    }
}
