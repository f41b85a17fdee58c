//! Workspace storage
//!
//! The workspace holds connection records keyed by name. Two stores are
//! provided: a purely in-memory one and one persisted to a JSON file.

use crate::error::{Result, SyncError};
use crate::workspace::ConnectionRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Connection storage used by the synchronizer
#[async_trait]
pub trait Workspace: Send + Sync {
    /// All connections, ordered by name
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>>;

    /// Connection by name
    async fn get_connection(&self, name: &str) -> Result<Option<ConnectionRecord>>;

    /// Connections mirroring a catalog id
    async fn find_by_catalog_id(&self, catalog_id: &str) -> Result<Vec<ConnectionRecord>> {
        Ok(self
            .list_connections()
            .await?
            .into_iter()
            .filter(|r| r.mirrors(catalog_id))
            .collect())
    }

    /// Insert or replace a connection
    async fn put_connection(&self, record: ConnectionRecord) -> Result<()>;

    /// Remove a connection; `false` if it was not there
    async fn remove_connection(&self, name: &str) -> Result<bool>;
}

/// Workspace held in memory
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    records: RwLock<BTreeMap<String, ConnectionRecord>>,
}

impl InMemoryWorkspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records
    pub fn snapshot(&self) -> BTreeMap<String, ConnectionRecord> {
        self.records.read().unwrap().clone()
    }
}

#[async_trait]
impl Workspace for InMemoryWorkspace {
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    async fn get_connection(&self, name: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.read().unwrap().get(name).cloned())
    }

    async fn put_connection(&self, record: ConnectionRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.name.clone(), record);
        Ok(())
    }

    async fn remove_connection(&self, name: &str) -> Result<bool> {
        Ok(self.records.write().unwrap().remove(name).is_some())
    }
}

/// Workspace persisted as a pretty-printed JSON file
///
/// The whole file is loaded when opened and rewritten after each change.
/// The in-memory copy only changes once the file write succeeded.
pub struct JsonFileWorkspace {
    /// Storage path
    path: PathBuf,
    /// In-memory copy
    cache: RwLock<BTreeMap<String, ConnectionRecord>>,
}

impl JsonFileWorkspace {
    /// Open (or create) a workspace file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
            }
        }

        let records = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
            let list: Vec<ConnectionRecord> = if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    SyncError::Workspace(format!("{}: {}", path.display(), e))
                })?
            };
            list.into_iter().map(|r| (r.name.clone(), r)).collect()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            cache: RwLock::new(records),
        })
    }

    /// Storage path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, records: &BTreeMap<String, ConnectionRecord>) -> Result<()> {
        let list: Vec<&ConnectionRecord> = records.values().collect();
        let content = serde_json::to_string_pretty(&list)
            .map_err(|e| SyncError::Workspace(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| SyncError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| SyncError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl Workspace for JsonFileWorkspace {
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self.cache.read().unwrap().values().cloned().collect())
    }

    async fn get_connection(&self, name: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self.cache.read().unwrap().get(name).cloned())
    }

    async fn put_connection(&self, record: ConnectionRecord) -> Result<()> {
        let mut cache = self.cache.write().unwrap();
        let mut updated = cache.clone();
        updated.insert(record.name.clone(), record);
        self.save(&updated)?;
        *cache = updated;
        Ok(())
    }

    async fn remove_connection(&self, name: &str) -> Result<bool> {
        let mut cache = self.cache.write().unwrap();
        if !cache.contains_key(name) {
            return Ok(false);
        }
        let mut updated = cache.clone();
        updated.remove(name);
        self.save(&updated)?;
        *cache = updated;
        Ok(true)
    }
}
