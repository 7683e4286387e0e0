//! Ledger page whose reads and writes always fail.

use async_trait::async_trait;
use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::{LedgerPage, PageChange};
use tokio::sync::broadcast;

/// A ledger page that fails every read and write with
/// [`StoryError::Ledger`] and never notifies.
#[derive(Debug)]
pub struct FailingLedgerPage {
    changes: broadcast::Sender<PageChange>,
}

impl FailingLedgerPage {
    /// Creates the page.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(1);
        Self { changes }
    }
}

impl Default for FailingLedgerPage {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable() -> StoryError {
    StoryError::Ledger("ledger unavailable".to_owned())
}

#[async_trait]
impl LedgerPage for FailingLedgerPage {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, StoryError> {
        Err(unavailable())
    }

    async fn get_prefix(
        &self,
        _prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StoryError> {
        Err(unavailable())
    }

    async fn put(&self, _key: &str, _value: serde_json::Value) -> Result<(), StoryError> {
        Err(unavailable())
    }

    fn watch(&self) -> broadcast::Receiver<PageChange> {
        self.changes.subscribe()
    }
}
