//! Return of Reckoning realm status.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Fetcher, HttpClient, Page};
use crate::cache::{Cacheable, UpstreamError};
use crate::models::ServerStatus;

#[derive(Debug, Deserialize)]
struct RealmRow {
    name: String,
    #[serde(default)]
    online: bool,
    population: Option<String>,
    #[serde(alias = "order")]
    order_players: Option<u32>,
    #[serde(alias = "destruction")]
    destruction_players: Option<u32>,
}

impl From<RealmRow> for ServerStatus {
    fn from(r: RealmRow) -> Self {
        Self {
            name: r.name.trim().to_owned(),
            online: r.online,
            population: r.population.filter(|p| !p.is_empty()),
            order_players: r.order_players,
            destruction_players: r.destruction_players,
        }
    }
}

pub struct RorClient {
    http: HttpClient,
    status_url: url::Url,
}

impl RorClient {
    pub fn new(http: HttpClient, status_url: &str) -> Result<Self, UpstreamError> {
        let status_url = url::Url::parse(status_url)
            .map_err(|e| UpstreamError::new(None, format!("invalid status url {status_url}: {e}")))?;
        Ok(Self { http, status_url })
    }

    async fn realms(&self) -> Result<Vec<ServerStatus>, UpstreamError> {
        let rows: Vec<RealmRow> = self.http.get_json(self.http.get(self.status_url.clone())).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Fetcher<ServerStatus> for RorClient {
    /// `key` is the cached key, i.e. the lowercased realm name.
    async fn fetch_one(&self, key: &str) -> Result<ServerStatus, UpstreamError> {
        self.realms()
            .await?
            .into_iter()
            .find(|s| s.key() == key)
            .ok_or_else(|| UpstreamError::not_found(format!("server `{key}`")))
    }

    async fn fetch_page(&self, _cursor: Option<&str>) -> Result<Page<ServerStatus>, UpstreamError> {
        Ok(Page::last(self.realms().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::json::parse_json_with_context;

    #[test]
    fn realm_rows_accept_short_faction_names() {
        let body = r#"[
            {"name": "Martyrs Square ", "online": true, "population": "High", "order": 312, "destruction": 298},
            {"name": "Iron Rock", "population": ""}
        ]"#;
        let rows: Vec<RealmRow> = parse_json_with_context(body).unwrap();
        let realms: Vec<ServerStatus> = rows.into_iter().map(Into::into).collect();

        assert_eq!(realms[0].name, "Martyrs Square");
        assert_eq!(realms[0].key(), "martyrs square");
        assert_eq!(realms[0].order_players, Some(312));
        assert!(!realms[1].online);
        assert_eq!(realms[1].population, None);
    }
}
