//! Live link values and the connections that observe them.
//!
//! Each link owns a `watch` channel carrying its current JSON value. Every
//! connection holds a receiver of that channel, so a write is observed by all
//! connections of the link. A link record lives while at least one
//! connection is open or a chain slot references it.

use std::collections::BTreeMap;

use tokio::sync::watch;

use storyrunner_core::error::StoryError;
use storyrunner_core::link::{LinkConnectionType, LinkPath};

use super::chain_registry::ChainRegistry;

/// Identifies one connection to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Debug)]
struct LinkRecord {
    value: watch::Sender<serde_json::Value>,
    connections: BTreeMap<ConnectionId, LinkConnectionType>,
}

impl LinkRecord {
    fn new(initial: serde_json::Value) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value,
            connections: BTreeMap::new(),
        }
    }
}

/// What disposing a connection did to its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// Neither the link nor the connection was known.
    Unknown,
    /// The link is still referenced and was kept.
    Retained,
    /// The last reference went away and the link was removed.
    Purged,
}

/// All links of a story.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    links: BTreeMap<LinkPath, LinkRecord>,
    next_connection: u64,
}

impl LinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a record exists for `path`.
    #[must_use]
    pub fn contains(&self, path: &LinkPath) -> bool {
        self.links.contains_key(path)
    }

    /// Creates a link with an initial value. Returns `false` and leaves the
    /// existing value untouched if the link already exists.
    pub fn create(&mut self, path: LinkPath, initial: serde_json::Value) -> bool {
        if self.links.contains_key(&path) {
            return false;
        }
        self.links.insert(path, LinkRecord::new(initial));
        true
    }

    /// Opens a connection to `path`, creating the link with a `null` value if
    /// it does not exist yet. Returns the connection id, a receiver of the
    /// link value, and whether the link was created.
    pub fn connect(
        &mut self,
        path: &LinkPath,
        connection_type: LinkConnectionType,
    ) -> (ConnectionId, watch::Receiver<serde_json::Value>, bool) {
        let created = self.create(path.clone(), serde_json::Value::Null);
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let record = self
            .links
            .entry(path.clone())
            .or_insert_with(|| LinkRecord::new(serde_json::Value::Null));
        record.connections.insert(id, connection_type);
        (id, record.value.subscribe(), created)
    }

    /// Access type of an open connection.
    #[must_use]
    pub fn connection_type(&self, path: &LinkPath, id: ConnectionId) -> Option<LinkConnectionType> {
        self.links.get(path)?.connections.get(&id).copied()
    }

    /// Current value of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::LinkNotFound`] if no record exists.
    pub fn get(&self, path: &LinkPath) -> Result<serde_json::Value, StoryError> {
        self.links
            .get(path)
            .map(|record| record.value.borrow().clone())
            .ok_or_else(|| StoryError::LinkNotFound(path.clone()))
    }

    /// Replaces the value of `path` and notifies every connection. Returns
    /// `true` if the value differs from the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::LinkNotFound`] if no record exists.
    pub fn set(&mut self, path: &LinkPath, value: serde_json::Value) -> Result<bool, StoryError> {
        let record = self
            .links
            .get(path)
            .ok_or_else(|| StoryError::LinkNotFound(path.clone()))?;
        let changed = record.value.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        Ok(changed)
    }

    /// Closes a connection. The link is purged when it has no connections
    /// left and no chain slot references it.
    pub fn dispose(
        &mut self,
        path: &LinkPath,
        id: ConnectionId,
        chains: &ChainRegistry,
    ) -> DisposeOutcome {
        let Some(record) = self.links.get_mut(path) else {
            return DisposeOutcome::Unknown;
        };
        if record.connections.remove(&id).is_none() {
            return DisposeOutcome::Unknown;
        }
        if record.connections.is_empty() && !chains.references(path) {
            self.links.remove(path);
            DisposeOutcome::Purged
        } else {
            DisposeOutcome::Retained
        }
    }

    /// Removes links that have no open connection and that no chain slot
    /// references any more. Returns the removed paths.
    pub fn purge_unreferenced(&mut self, chains: &ChainRegistry) -> Vec<LinkPath> {
        let purged: Vec<LinkPath> = self
            .links
            .iter()
            .filter(|(path, record)| record.connections.is_empty() && !chains.references(path))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &purged {
            self.links.remove(path);
        }
        purged
    }

    /// Paths of all live links.
    #[must_use]
    pub fn paths(&self) -> Vec<LinkPath> {
        self.links.keys().cloned().collect()
    }

    /// Number of live links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Returns `true` if no links are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drops every link. Outstanding receivers observe the channel closing.
    pub fn clear(&mut self) -> Vec<LinkPath> {
        let paths = self.paths();
        self.links.clear();
        paths
    }
}
