//! Link connection, write and disposal operations.

use tracing::{debug, warn};

use storyrunner_core::error::StoryError;
use storyrunner_core::link::{LinkConnectionType, LinkPath};

use super::StoryRuntime;
use crate::application::context::LinkConnection;
use crate::application::page::link_key;
use crate::domain::events::LinkEvent;
use crate::domain::link_registry::{ConnectionId, DisposeOutcome};

impl StoryRuntime {
    /// Opens a connection, creating the link from its persisted value (or
    /// `null`) on first use.
    pub(super) async fn connect_link(
        &mut self,
        path: LinkPath,
        connection_type: LinkConnectionType,
    ) -> Result<LinkConnection, StoryError> {
        let controller = self.handle()?;
        if !self.links.contains(&path) {
            let initial = self
                .read_persisted_link(&path)
                .await
                .unwrap_or(serde_json::Value::Null);
            self.links.create(path.clone(), initial);
            self.watchers.link(LinkEvent::Added(path.clone()));
        }
        let (id, value, _) = self.links.connect(&path, connection_type);
        debug!(link = %path, ?connection_type, "link connected");
        Ok(LinkConnection::new(controller, path, id, connection_type, value))
    }

    pub(super) async fn write_link(
        &mut self,
        path: LinkPath,
        connection: ConnectionId,
        value: serde_json::Value,
    ) -> Result<(), StoryError> {
        match self.links.connection_type(&path, connection) {
            Some(LinkConnectionType::ReadWrite) => {}
            Some(LinkConnectionType::ReadOnly) => return Err(StoryError::ReadOnlyLink(path)),
            None => return Err(StoryError::LinkNotFound(path)),
        }
        if self.links.set(&path, value.clone())? {
            if let Err(error) = self.page.write_link(&path, value).await {
                warn!(link = %path, %error, "failed to persist link value");
            }
        }
        Ok(())
    }

    pub(super) fn dispose_link(&mut self, path: &LinkPath, connection: ConnectionId) {
        match self.links.dispose(path, connection, &self.chains) {
            DisposeOutcome::Purged => self.watchers.link(LinkEvent::Removed(path.clone())),
            DisposeOutcome::Retained => {}
            DisposeOutcome::Unknown => debug!(link = %path, "dispose of unknown link connection"),
        }
    }

    /// Applies a link value observed on the ledger without writing it back.
    pub(super) fn link_value_changed(&mut self, key: &str, value: serde_json::Value) {
        let Some(path) = self
            .links
            .paths()
            .into_iter()
            .find(|path| link_key(path) == key)
        else {
            return;
        };
        if let Ok(true) = self.links.set(&path, value) {
            debug!(link = %path, "link value updated from ledger");
        }
    }

    pub(super) async fn read_persisted_link(&self, path: &LinkPath) -> Option<serde_json::Value> {
        match self.page.read_link(path).await {
            Ok(value) => value,
            Err(error) => {
                warn!(link = %path, %error, "failed to read persisted link value");
                None
            }
        }
    }
}
