//! Recognizes ledger notifications that echo this controller's own writes.
//!
//! The ledger notifies about every change, including the ones this
//! controller made. An echo can arrive after later local writes to the same
//! key; applying it would bring back a value that was already replaced.

use std::collections::{HashMap, VecDeque};

/// Writes whose echo never arrives (the page skips unchanged values) must
/// not pile up.
const MAX_PENDING_PER_KEY: usize = 32;

/// Local writes not yet echoed back, per ledger key, oldest first.
#[derive(Debug, Default)]
pub struct EchoFilter {
    pending: HashMap<String, VecDeque<serde_json::Value>>,
}

impl EchoFilter {
    /// Creates a filter with no pending writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a value this controller wrote under `key`.
    pub fn record(&mut self, key: &str, value: serde_json::Value) {
        let pending = self.pending.entry(key.to_owned()).or_default();
        if pending.len() == MAX_PENDING_PER_KEY {
            pending.pop_front();
        }
        pending.push_back(value);
    }

    /// Consumes the echo of a local write and returns `true` if a later local
    /// write to the same key is still on its way, so the notified value is
    /// already stale. Values written elsewhere are never stale.
    pub fn is_superseded(&mut self, key: &str, value: &serde_json::Value) -> bool {
        let Some(pending) = self.pending.get_mut(key) else {
            return false;
        };
        let Some(position) = pending.iter().position(|written| written == value) else {
            return false;
        };
        pending.drain(..=position);
        if pending.is_empty() {
            self.pending.remove(key);
            return false;
        }
        true
    }
}
