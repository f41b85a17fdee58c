//! Catalog sources and the catalog contract

use crate::catalog::SourceType;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A data source published by the connection catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSource {
    /// Catalog identifier (the id carried by change events)
    pub id: String,
    /// Source name; may differ from the display name
    pub name: String,
    /// Detected data source type
    pub source_type: SourceType,
    /// Whether the source is already bound to this workspace
    #[serde(default)]
    pub bound: bool,
    /// Translator the engine uses for this source
    pub translator_name: String,
    /// Connection properties as published by the catalog
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CatalogSource {
    /// Build a source, detecting its type from the properties
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        properties: BTreeMap<String, String>,
    ) -> Self {
        let source_type = SourceType::detect(&properties);
        Self {
            id: id.into(),
            name: name.into(),
            source_type,
            bound: false,
            translator_name: source_type.translator_name().to_string(),
            properties,
        }
    }

    /// Derive the binding the workspace records for this source
    pub fn binding(&self) -> SourceBinding {
        SourceBinding {
            jndi_name: self.name.clone(),
            driver_name: self.source_type.name().to_string(),
            jdbc: self.source_type.is_jdbc(),
            properties: self.source_type.internal_properties(&self.name, &self.properties),
        }
    }
}

/// Result of binding a catalog source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBinding {
    /// JNDI name the engine registers the source under
    pub jndi_name: String,
    /// Driver (type) name
    pub driver_name: String,
    /// Whether the source is reached over JDBC
    pub jdbc: bool,
    /// Engine-side data source properties
    pub properties: BTreeMap<String, String>,
}

/// The external system of record for data source bindings
#[async_trait]
pub trait ConnectionCatalog: Send + Sync {
    /// List every source currently in the catalog
    async fn list_sources(&self) -> Result<Vec<CatalogSource>>;

    /// Look up a source by catalog id
    async fn get_source(&self, id: &str) -> Result<Option<CatalogSource>> {
        Ok(self.list_sources().await?.into_iter().find(|s| s.id == id))
    }

    /// Bind a resolved source, returning what the workspace should record
    async fn bind_source(&self, source: &CatalogSource) -> Result<SourceBinding> {
        Ok(source.binding())
    }
}

/// In-process catalog, keyed by source id
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    sources: RwLock<BTreeMap<String, CatalogSource>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the given sources
    pub fn with_sources(sources: impl IntoIterator<Item = CatalogSource>) -> Self {
        let catalog = Self::new();
        for source in sources {
            catalog.insert(source);
        }
        catalog
    }

    /// Add or replace a source
    pub fn insert(&self, source: CatalogSource) {
        self.sources
            .write()
            .unwrap()
            .insert(source.id.clone(), source);
    }

    /// Remove a source by id
    pub fn remove(&self, id: &str) -> Option<CatalogSource> {
        self.sources.write().unwrap().remove(id)
    }

    /// Number of sources
    pub fn len(&self) -> usize {
        self.sources.read().unwrap().len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConnectionCatalog for InMemoryCatalog {
    async fn list_sources(&self) -> Result<Vec<CatalogSource>> {
        Ok(self.sources.read().unwrap().values().cloned().collect())
    }

    async fn get_source(&self, id: &str) -> Result<Option<CatalogSource>> {
        Ok(self.sources.read().unwrap().get(id).cloned())
    }

    async fn bind_source(&self, source: &CatalogSource) -> Result<SourceBinding> {
        let mut sources = self.sources.write().unwrap();
        let stored = sources
            .get_mut(&source.id)
            .ok_or_else(|| SyncError::SourceNotFound(source.id.clone()))?;
        stored.bound = true;
        Ok(stored.binding())
    }
}
