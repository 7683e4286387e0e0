//! Typed access to a story's ledger page.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::{LedgerPage, PageChange};
use storyrunner_core::link::LinkPath;
use storyrunner_core::module::{ModuleData, ModulePath};
use storyrunner_core::story::{StoryContextLog, StoryData};

use crate::domain::echo_filter::EchoFilter;

/// Key of the story data record.
pub const STORY_KEY: &str = "Story";
/// Prefix of module record keys.
pub const MODULE_PREFIX: &str = "Module/";
/// Prefix of link value keys.
pub const LINK_PREFIX: &str = "Link/";
/// Prefix of context log keys.
pub const CONTEXT_LOG_PREFIX: &str = "ContextLog/";

/// Ledger key of a module record.
#[must_use]
pub fn module_key(path: &ModulePath) -> String {
    format!("{MODULE_PREFIX}{}", path.encode())
}

/// Ledger key of a link value.
#[must_use]
pub fn link_key(path: &LinkPath) -> String {
    format!("{LINK_PREFIX}{}", path.encode())
}

/// Ledger key of a context log entry. Entries sort by time; the id keeps
/// entries logged at the same instant apart.
#[must_use]
pub fn context_log_key(entry: &StoryContextLog, id: Uuid) -> String {
    let nanos = entry.time.timestamp_nanos_opt().unwrap_or_default().max(0);
    format!("{CONTEXT_LOG_PREFIX}{nanos:020}/{id}")
}

/// A story's ledger page with typed records.
///
/// Remembers what it wrote so that stale echoes of its own writes can be
/// told apart from changes made elsewhere.
#[derive(Clone)]
pub struct StoryPage {
    page: Arc<dyn LedgerPage>,
    echoes: Arc<Mutex<EchoFilter>>,
}

impl StoryPage {
    /// Wraps a raw page.
    pub fn new(page: Arc<dyn LedgerPage>) -> Self {
        Self {
            page,
            echoes: Arc::new(Mutex::new(EchoFilter::new())),
        }
    }

    /// Returns `true` if `change` echoes a local write that a later local
    /// write to the same key has replaced.
    pub fn is_stale_echo(&self, change: &PageChange) -> bool {
        self.echoes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_superseded(&change.key, &change.value)
    }

    /// Reads the story data record.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the read fails or the record is
    /// malformed.
    pub async fn read_story(&self) -> Result<Option<StoryData>, StoryError> {
        self.read(STORY_KEY).await
    }

    /// Writes the story data record.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the write fails.
    pub async fn write_story(&self, data: &StoryData) -> Result<(), StoryError> {
        self.write(STORY_KEY, data).await
    }

    /// Reads every module record, parents before children.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the read fails or a record is
    /// malformed.
    pub async fn read_modules(&self) -> Result<Vec<ModuleData>, StoryError> {
        self.page
            .get_prefix(MODULE_PREFIX)
            .await?
            .into_iter()
            .map(|(key, value)| decode(&key, value))
            .collect()
    }

    /// Writes a module record.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the write fails.
    pub async fn write_module(&self, data: &ModuleData) -> Result<(), StoryError> {
        self.write(&module_key(&data.module_path), data).await
    }

    /// Reads the persisted value of a link.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the read fails.
    pub async fn read_link(
        &self,
        path: &LinkPath,
    ) -> Result<Option<serde_json::Value>, StoryError> {
        self.page.get(&link_key(path)).await
    }

    /// Persists a link value.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the write fails.
    pub async fn write_link(
        &self,
        path: &LinkPath,
        value: serde_json::Value,
    ) -> Result<(), StoryError> {
        self.put(&link_key(path), value).await
    }

    /// Appends a context log entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the write fails.
    pub async fn append_context_log(&self, entry: &StoryContextLog) -> Result<(), StoryError> {
        self.write(&context_log_key(entry, Uuid::now_v7()), entry).await
    }

    /// Reads all context log entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the read fails or an entry is
    /// malformed.
    pub async fn read_context_log(&self) -> Result<Vec<StoryContextLog>, StoryError> {
        self.page
            .get_prefix(CONTEXT_LOG_PREFIX)
            .await?
            .into_iter()
            .map(|(key, value)| decode(&key, value))
            .collect()
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoryError> {
        self.page
            .get(key)
            .await?
            .map(|value| decode(key, value))
            .transpose()
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, record: &T) -> Result<(), StoryError> {
        let value = serde_json::to_value(record)
            .map_err(|e| StoryError::Ledger(format!("failed to encode {key}: {e}")))?;
        self.put(key, value).await
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StoryError> {
        self.page.put(key, value.clone()).await?;
        // Notifications are handled between operations, so recording after
        // the write still precedes the echo.
        self.echoes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(key, value);
        Ok(())
    }
}

/// Decodes a ledger record.
///
/// # Errors
///
/// Returns [`StoryError::Ledger`] naming the key if the value is malformed.
pub fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, StoryError> {
    serde_json::from_value(value)
        .map_err(|e| StoryError::Ledger(format!("malformed record {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use storyrunner_core::story::StorySignal;

    use super::*;

    #[test]
    fn test_keys_use_encoded_paths() {
        let module = ModulePath::from_segments(["a", "b:c"]);

        assert_eq!(module_key(&module), "Module/a:b\\:c");
        assert_eq!(link_key(&LinkPath::new(module, "x")), "Link/a:b\\:c/x");
    }

    #[test]
    fn test_context_log_keys_sort_by_time() {
        let entry = |second| StoryContextLog {
            signal: StorySignal::Created,
            device_id: "d".to_owned(),
            time: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, second).unwrap(),
            context: BTreeMap::new(),
        };

        let early = context_log_key(&entry(1), Uuid::now_v7());
        let late = context_log_key(&entry(2), Uuid::nil());

        assert!(early.starts_with(CONTEXT_LOG_PREFIX));
        assert!(early < late);
    }
}
