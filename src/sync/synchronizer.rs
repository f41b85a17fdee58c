//! Catalog to workspace synchronization
//!
//! Every operation here is idempotent: applying the same event or running
//! the same reconciliation twice leaves the workspace as applying it once.
//! The monitor depends on that when it retries a failed handler whose
//! first attempt may have partially applied.

use crate::catalog::ConnectionCatalog;
use crate::error::{Result, SyncError};
use crate::events::{ChangeAction, ChangeEvent};
use crate::workspace::{ConnectionRecord, Workspace};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What the monitor needs from the workspace/catalog layer
#[async_trait]
pub trait ConnectionSynchronizer: Send + Sync {
    /// Full reconciliation of catalog connections into the workspace
    async fn synchronize_connections(&self) -> Result<SyncReport>;

    /// Apply one change event; must be idempotent under retry
    async fn handle_connection_event(&self, event: &ChangeEvent) -> Result<()>;
}

/// Outcome of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Connections created in the workspace
    pub added: Vec<String>,
    /// Connections whose content changed
    pub updated: Vec<String>,
    /// Connections removed because their source left the catalog
    pub removed: Vec<String>,
    /// Connections already up to date
    pub unchanged: usize,
}

impl SyncReport {
    /// Whether the reconciliation changed anything
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed, {} unchanged",
            self.added.len(),
            self.updated.len(),
            self.removed.len(),
            self.unchanged
        )
    }
}

/// Result of writing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Added,
    Updated,
    Unchanged,
}

/// Synchronizer between a [`ConnectionCatalog`] and a [`Workspace`]
pub struct CatalogSynchronizer {
    catalog: Arc<dyn ConnectionCatalog>,
    workspace: Arc<dyn Workspace>,
}

impl CatalogSynchronizer {
    /// Create a synchronizer over the given collaborators
    pub fn new(catalog: Arc<dyn ConnectionCatalog>, workspace: Arc<dyn Workspace>) -> Self {
        Self { catalog, workspace }
    }

    /// The workspace being kept in sync
    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// Bind a catalog source and upsert its workspace record
    async fn apply_source(&self, id: &str) -> Result<Option<(String, Applied)>> {
        let source = match self.catalog.get_source(id).await? {
            Some(source) => source,
            None => return Ok(None),
        };

        let binding = self.catalog.bind_source(&source).await?;
        let record = ConnectionRecord::from_catalog(&source, &binding);
        let name = record.name.clone();

        // A rename in the catalog leaves the old record behind under its old name
        for stale in self.workspace.find_by_catalog_id(id).await? {
            if stale.name != name {
                self.workspace.remove_connection(&stale.name).await?;
            }
        }

        let applied = match self.workspace.get_connection(&name).await? {
            Some(existing) if existing.same_content(&record) => Applied::Unchanged,
            Some(existing) if existing.catalog_id.is_none() => {
                return Err(SyncError::Workspace(format!(
                    "connection '{}' exists and is not managed by the catalog",
                    name
                )));
            }
            Some(_) => Applied::Updated,
            None => Applied::Added,
        };

        if applied != Applied::Unchanged {
            self.workspace.put_connection(record).await?;
        }
        Ok(Some((name, applied)))
    }

    /// Remove every record mirroring a catalog id
    async fn remove_source(&self, id: &str) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for record in self.workspace.find_by_catalog_id(id).await? {
            if self.workspace.remove_connection(&record.name).await? {
                removed.push(record.name);
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ConnectionSynchronizer for CatalogSynchronizer {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn synchronize_connections(&self) -> Result<SyncReport> {
        let sources = self.catalog.list_sources().await?;
        let mut report = SyncReport::default();
        let mut live: HashSet<String> = HashSet::new();

        for source in &sources {
            live.insert(source.id.clone());
            match self.apply_source(&source.id).await {
                Ok(Some((name, Applied::Added))) => report.added.push(name),
                Ok(Some((name, Applied::Updated))) => report.updated.push(name),
                Ok(Some((_, Applied::Unchanged))) => report.unchanged += 1,
                // Removed from the catalog between listing and lookup
                Ok(None) => {
                    live.remove(&source.id);
                }
                Err(e) => {
                    tracing::warn!("Skipping catalog source '{}': {}", source.name, e);
                }
            }
        }

        for record in self.workspace.list_connections().await? {
            let Some(catalog_id) = record.catalog_id.as_deref() else {
                continue;
            };
            if !live.contains(catalog_id)
                && self.workspace.remove_connection(&record.name).await?
            {
                report.removed.push(record.name);
            }
        }

        tracing::info!("Connection reconciliation finished: {}", report);
        Ok(report)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(event = %event))]
    async fn handle_connection_event(&self, event: &ChangeEvent) -> Result<()> {
        match event.action {
            ChangeAction::Created | ChangeAction::Updated => {
                match self.apply_source(&event.id).await? {
                    Some((name, applied)) => {
                        tracing::debug!("Connection '{}' {:?}", name, applied);
                    }
                    None => {
                        // Gone again before we got to it
                        let removed = self.remove_source(&event.id).await?;
                        tracing::debug!(
                            "Source '{}' no longer in catalog, removed {:?}",
                            event.id,
                            removed
                        );
                    }
                }
            }
            ChangeAction::Deleted => {
                let removed = self.remove_source(&event.id).await?;
                tracing::debug!("Removed {:?} for deleted source '{}'", removed, event.id);
            }
        }
        Ok(())
    }
}
