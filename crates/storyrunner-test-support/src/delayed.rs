//! Ledger page that holds back its change notifications.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::{LedgerPage, PageChange};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 64;

/// A ledger page whose writes apply at once but whose notifications are
/// only sent when the test releases them, in any order.
#[derive(Debug)]
pub struct DelayedPage {
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
    held: Mutex<Vec<PageChange>>,
    changes: broadcast::Sender<PageChange>,
}

impl DelayedPage {
    /// Creates an empty page.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            held: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Notifications written so far and not released yet, oldest first.
    pub fn held(&self) -> Vec<PageChange> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sends the oldest held notification of `value` under `key`. Returns
    /// `false` if no such notification is held.
    pub fn release(&self, key: &str, value: &serde_json::Value) -> bool {
        let change = {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(position) = held
                .iter()
                .position(|change| change.key == key && change.value == *value)
            else {
                return false;
            };
            held.remove(position)
        };
        let _ = self.changes.send(change);
        true
    }
}

impl Default for DelayedPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPage for DelayedPage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StoryError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoryError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.clone());
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PageChange {
                key: key.to_owned(),
                value,
            });
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<PageChange> {
        self.changes.subscribe()
    }
}
