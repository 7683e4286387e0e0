//! In-memory implementation of the `LedgerPage` trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::{LedgerPage, PageChange};

/// Capacity of each page's change notification buffer.
const CHANGE_CAPACITY: usize = 256;

/// A collection of in-memory pages, one per story.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    pages: Mutex<HashMap<String, Arc<InMemoryPage>>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the page with the given id, creating it on first use.
    pub fn page(&self, page_id: &str) -> Arc<InMemoryPage> {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            pages
                .entry(page_id.to_owned())
                .or_insert_with(|| Arc::new(InMemoryPage::new())),
        )
    }
}

/// A single ledger page held in memory.
#[derive(Debug)]
pub struct InMemoryPage {
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
    changes: broadcast::Sender<PageChange>,
}

impl InMemoryPage {
    /// Creates an empty page.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    /// Number of entries on the page.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the page holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPage for InMemoryPage {
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
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoryError> {
        let changed = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(existing) if *existing == value => false,
                _ => {
                    entries.insert(key.to_owned(), value.clone());
                    true
                }
            }
        };

        if changed {
            debug!(key, "ledger page entry changed");
            // No receivers is fine: nobody watches the page yet.
            let _ = self.changes.send(PageChange {
                key: key.to_owned(),
                value,
            });
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<PageChange> {
        self.changes.subscribe()
    }
}
