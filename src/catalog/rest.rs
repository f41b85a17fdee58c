//! Catalog backed by the catalog service's REST API

use crate::catalog::{CatalogSource, ConnectionCatalog};
use crate::config::MonitorConfig;
use crate::error::{Result, SyncError};
use crate::http::{build_client, check_status, with_service_headers};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Listing response: `{"items": [...]}`
#[derive(Debug, Deserialize)]
struct ConnectionList {
    #[serde(default)]
    items: Vec<ConnectionItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionItem {
    id: String,
    name: String,
    #[serde(default)]
    configured_properties: BTreeMap<String, String>,
}

impl From<ConnectionItem> for CatalogSource {
    fn from(item: ConnectionItem) -> Self {
        CatalogSource::new(item.id, item.name, item.configured_properties)
    }
}

/// Catalog that lists connections over HTTP
pub struct HttpCatalog {
    client: Client,
    config: MonitorConfig,
}

impl HttpCatalog {
    /// Create a catalog client from configuration
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Listing endpoint
    pub fn url(&self) -> &str {
        &self.config.catalog_url
    }
}

/// Parse a listing response body
fn parse_listing(body: &[u8]) -> Result<Vec<CatalogSource>> {
    let list: ConnectionList = serde_json::from_slice(body)
        .map_err(|e| SyncError::Catalog(format!("invalid connection listing: {}", e)))?;
    Ok(list.items.into_iter().map(CatalogSource::from).collect())
}

#[async_trait]
impl ConnectionCatalog for HttpCatalog {
    async fn list_sources(&self) -> Result<Vec<CatalogSource>> {
        let request = with_service_headers(self.client.get(self.url()), &self.config);
        let response = check_status(request.send().await?)?;
        let body = response.bytes().await?;
        let sources = parse_listing(&body)?;
        tracing::debug!("Catalog listed {} connections", sources.len());
        Ok(sources)
    }
}
