//! Ashes of Creation codex client.
//!
//! The codex is a single PostgREST table of `{guid, section, data}` rows where
//! `data` is free-form JSON exported from the game. Each entity kind lives in
//! its own section. Listing is offset-paginated and ordered by guid so pages
//! stay stable while the table is being read.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{Fetcher, HttpClient, Page, endpoint};
use crate::cache::UpstreamError;
use crate::models::{Ingredient, Item, Mob, MobDrop, Recipe};

/// A raw codex row.
#[derive(Debug, Clone, Deserialize)]
pub struct CodexRow {
    pub guid: String,
    pub section: String,
    pub data: Value,
}

/// A payload that can be decoded from one codex section.
pub trait CodexRecord: Sized + Send + 'static {
    const SECTION: &'static str;

    /// `None` for rows missing the fields this kind needs.
    fn from_row(row: &CodexRow) -> Option<Self>;
}

pub struct CodexClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
}

impl CodexClient {
    pub fn new(http: HttpClient, base_url: String, api_key: Option<String>, page_size: u32) -> Self {
        Self {
            http,
            base_url,
            api_key,
            page_size: page_size.max(1),
        }
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<Vec<CodexRow>, UpstreamError> {
        let mut url = endpoint(&self.base_url, "rest/v1/codex")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "guid,section,data");
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}"));
        }
        self.http.get_json(request).await
    }
}

#[async_trait]
impl<T: CodexRecord> Fetcher<T> for CodexClient {
    async fn fetch_one(&self, key: &str) -> Result<T, UpstreamError> {
        let rows = self
            .query(&[
                ("section", format!("eq.{}", T::SECTION)),
                ("guid", format!("eq.{key}")),
                ("limit", "1".to_owned()),
            ])
            .await?;

        let row = rows
            .first()
            .ok_or_else(|| UpstreamError::not_found(format!("codex {} `{key}`", T::SECTION)))?;
        T::from_row(row).ok_or_else(|| {
            UpstreamError::malformed(format!("codex {} `{key}` is missing required fields", T::SECTION))
        })
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<T>, UpstreamError> {
        let offset: u64 = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| UpstreamError::malformed(format!("bad codex cursor `{c}`")))?,
            None => 0,
        };

        let rows = self
            .query(&[
                ("section", format!("eq.{}", T::SECTION)),
                ("order", "guid.asc".to_owned()),
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ])
            .await?;

        let fetched = rows.len();
        let items: Vec<T> = rows.iter().filter_map(T::from_row).collect();
        if items.len() < fetched {
            debug!(
                section = T::SECTION,
                skipped = fetched - items.len(),
                "Skipped codex rows missing required fields"
            );
        }

        let next = (fetched as u64 >= u64::from(self.page_size))
            .then(|| (offset + fetched as u64).to_string());
        trace!(section = T::SECTION, offset, fetched, "Fetched codex page");
        Ok(Page { items, next })
    }
}

fn text(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(decode_html_entities)
}

/// Codex strings occasionally carry HTML entities (`&#39;`, `&amp;`).
fn decode_html_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_owned();
    }
    htmlize::unescape(s).to_string()
}

/// Reference to another codex row, either a bare guid or `{"guid": ...}` / `{"item": ...}`.
fn guid_ref(v: &Value) -> Option<String> {
    text(v)
        .or_else(|| text(&v["guid"]))
        .or_else(|| text(&v["item"]))
}

fn drops(v: &Value) -> Vec<MobDrop> {
    v.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|d| {
                    Some(MobDrop {
                        guid: guid_ref(d)?,
                        drop_rate: d["dropRate"].as_f64().map(|r| r as f32),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl CodexRecord for Item {
    const SECTION: &'static str = "items";

    fn from_row(row: &CodexRow) -> Option<Self> {
        let data = &row.data;
        let internal_name = text(&data["name"]);
        let name = text(&data["itemName"]).or_else(|| internal_name.clone())?;
        let gameplay_tags = data["gameplayTags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        Some(Item {
            guid: row.guid.clone(),
            name,
            internal_name,
            gameplay_tags,
            rarity: text(&data["rarity"]),
        })
    }
}

impl CodexRecord for Recipe {
    const SECTION: &'static str = "recipes";

    fn from_row(row: &CodexRow) -> Option<Self> {
        let data = &row.data;
        let name = text(&data["recipeName"])
            .or_else(|| text(&data["itemName"]))
            .or_else(|| text(&data["name"]))?;
        let ingredients = data["ingredients"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|i| {
                        Some(Ingredient {
                            item_guid: guid_ref(i)?,
                            quantity: i["quantity"].as_i64().unwrap_or(1) as i32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Recipe {
            guid: row.guid.clone(),
            name,
            output_item_guid: guid_ref(&data["outputItem"]),
            ingredients,
        })
    }
}

impl CodexRecord for Mob {
    const SECTION: &'static str = "mobs";

    fn from_row(row: &CodexRow) -> Option<Self> {
        let data = &row.data;
        let name = text(&data["mobName"]).or_else(|| text(&data["name"]))?;

        Some(Mob {
            guid: row.guid.clone(),
            name,
            level: data["level"].as_i64().map(|l| l as i32),
            item_drops: drops(&data["itemDrops"]),
            recipe_drops: drops(&data["recipeDrops"]),
        })
    }
}
