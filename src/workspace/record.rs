//! Workspace connection records

use crate::catalog::{CatalogSource, SourceBinding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property holding the catalog source name a record was created from
pub const PROP_CATALOG_SOURCE: &str = "serviceCatalogSource";

/// A connection stored in the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connection name (unique within the workspace)
    pub name: String,
    /// Catalog id this record mirrors; `None` for hand-made connections
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// JNDI name the engine knows the source by
    pub jndi_name: String,
    /// Driver (type) name
    pub driver_name: String,
    /// Whether the connection is JDBC
    pub jdbc: bool,
    /// Additional properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// When this record was last written by a synchronization
    pub synced_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Build the record mirroring a catalog source
    pub fn from_catalog(source: &CatalogSource, binding: &SourceBinding) -> Self {
        let mut properties = binding.properties.clone();
        properties.insert(PROP_CATALOG_SOURCE.to_string(), source.name.clone());

        Self {
            name: source.name.clone(),
            catalog_id: Some(source.id.clone()),
            description: None,
            jndi_name: binding.jndi_name.clone(),
            driver_name: binding.driver_name.clone(),
            jdbc: binding.jdbc,
            properties,
            synced_at: Utc::now(),
        }
    }

    /// Whether this record mirrors the given catalog id
    pub fn mirrors(&self, catalog_id: &str) -> bool {
        self.catalog_id.as_deref() == Some(catalog_id)
    }

    /// Same content, ignoring the sync timestamp
    pub fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.catalog_id == other.catalog_id
            && self.description == other.description
            && self.jndi_name == other.jndi_name
            && self.driver_name == other.driver_name
            && self.jdbc == other.jdbc
            && self.properties == other.properties
    }
}

impl PartialEq for ConnectionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.same_content(other)
    }
}

impl Eq for ConnectionRecord {}
