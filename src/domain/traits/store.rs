use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::StorageError;

/// Store trait - abstraction for the shared document store
///
/// Modules own their own document-level atomicity; `upsert` replaces the
/// whole document under `key`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError>;
    async fn upsert(&self, collection: &str, key: &str, document: Value) -> Result<(), StorageError>;
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError>;
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StorageError>;
}
