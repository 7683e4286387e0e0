//! Ledger page abstraction.
//!
//! A story persists its records to one ledger page. The page is a key-value
//! map of JSON values that also notifies about every change, local or
//! synchronized from another device.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoryError;

/// A change observed on a ledger page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChange {
    /// Key that changed.
    pub key: String,
    /// New value under the key.
    pub value: serde_json::Value,
}

/// Port to the ledger page holding one story's records.
#[async_trait]
pub trait LedgerPage: Send + Sync {
    /// Reads the value stored under `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoryError>;

    /// Reads all entries whose key starts with `prefix`, ordered by key.
    async fn get_prefix(&self, prefix: &str)
    -> Result<Vec<(String, serde_json::Value)>, StoryError>;

    /// Writes `value` under `key`.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoryError>;

    /// Subscribes to change notifications for this page.
    fn watch(&self) -> broadcast::Receiver<PageChange>;
}
