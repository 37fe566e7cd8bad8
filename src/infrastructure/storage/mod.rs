//! JSON document store
//!
//! Collections live in memory; when opened on a directory each collection is
//! also written to `<dir>/<collection>.json` after every change.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::Store;

type Collection = BTreeMap<String, Value>;

/// JSON document store
#[derive(Clone, Default)]
pub struct JsonStore {
    base_path: Option<PathBuf>,
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl JsonStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store persisted under `base_path`, loading any existing collections
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path).await?;

        let mut collections = HashMap::new();
        let mut entries = tokio::fs::read_dir(&base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            let collection: Collection = serde_json::from_str(&content)
                .map_err(|e| StorageError::Serialization(format!("{}: {}", path.display(), e)))?;
            collections.insert(name, collection);
        }
        tracing::debug!(path = %base_path.display(), collections = collections.len(), "Opened document store");

        Ok(Self {
            base_path: Some(base_path),
            collections: Arc::new(RwLock::new(collections)),
        })
    }

    async fn persist(&self, name: &str, collection: &Collection) -> Result<(), StorageError> {
        let Some(base) = &self.base_path else {
            return Ok(());
        };
        let content =
            serde_json::to_string_pretty(collection).map_err(|e| StorageError::Serialization(e.to_string()))?;
        tokio::fs::write(base.join(format!("{}.json", name)), content).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn upsert(&self, collection: &str, key: &str, document: Value) -> Result<(), StorageError> {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        entry.insert(key.to_string(), document);
        self.persist(collection, entry).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let removed = entry.remove(key).is_some();
        if removed {
            self.persist(collection, entry).await?;
        }
        Ok(removed)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
