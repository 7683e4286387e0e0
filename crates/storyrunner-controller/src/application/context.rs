//! Handles given out to modules, the shell and providers.
//!
//! Every call on these handles becomes one operation on the story queue.

use tokio::sync::{oneshot, watch};

use storyrunner_core::error::StoryError;
use storyrunner_core::link::{LinkConnectionType, LinkPath};
use storyrunner_core::module::{
    ModuleIntent, ModulePath, ModuleSource, ModuleState, ModuleSurface, SurfaceRelation,
};

use super::controller::StoryController;
use super::operations::{ContainerRequest, Operation};
use super::watch::{EmbeddedModule, ModuleStateWatch};
use crate::domain::container::{ContainerLayout, ContainerNode, ContainerRelation};
use crate::domain::link_registry::ConnectionId;

/// The story as seen by one running module.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    controller: StoryController,
    module_path: ModulePath,
}

impl ModuleContext {
    pub(crate) fn new(controller: StoryController, module_path: ModulePath) -> Self {
        Self {
            controller,
            module_path,
        }
    }

    /// Path of the module holding this context.
    #[must_use]
    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    /// Id of the story.
    #[must_use]
    pub fn story_id(&self) -> &str {
        self.controller.story_id()
    }

    /// Starts a child module whose surface goes to the shell.
    ///
    /// # Errors
    ///
    /// Any start error.
    pub async fn start_module(
        &self,
        name: impl Into<String>,
        intent: ModuleIntent,
        relation: SurfaceRelation,
    ) -> Result<(), StoryError> {
        self.controller
            .start_module(
                self.module_path.clone(),
                name,
                intent,
                ModuleSurface::InShell(relation),
                ModuleSource::Internal,
            )
            .await
            .map(|_| ())
    }

    /// Starts a child module and returns its surface for embedding, with
    /// the watcher on which its focus requests arrive.
    ///
    /// # Errors
    ///
    /// Any start error.
    pub async fn embed_module(
        &self,
        name: impl Into<String>,
        intent: ModuleIntent,
    ) -> Result<EmbeddedModule, StoryError> {
        self.controller
            .embed_module(self.module_path.clone(), name, intent)
            .await
    }

    /// Starts a container of child modules in the shell.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::InvalidParent`] or [`StoryError::Shell`].
    pub async fn start_container_in_shell(
        &self,
        name: impl Into<String>,
        layout: Vec<ContainerLayout>,
        relationships: Vec<ContainerRelation>,
        nodes: Vec<ContainerNode>,
    ) -> Result<(), StoryError> {
        self.controller
            .start_container_in_shell(ContainerRequest {
                parent: self.module_path.clone(),
                name: name.into(),
                layout,
                relationships,
                nodes,
            })
            .await
    }

    /// Connects to a link owned by this module.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn connect_link(
        &self,
        name: impl Into<String>,
        connection_type: LinkConnectionType,
    ) -> Result<LinkConnection, StoryError> {
        self.controller
            .connect_link(LinkPath::new(self.module_path.clone(), name), connection_type)
            .await
    }

    /// Connects to the link a slot of this module's chain maps to.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn connect_chain_link(
        &self,
        key: impl Into<String>,
        connection_type: LinkConnectionType,
    ) -> Result<LinkConnection, StoryError> {
        let path = self
            .controller
            .link_path_for_chain_key(self.module_path.clone(), key)
            .await?;
        self.controller.connect_link(path, connection_type).await
    }

    /// Asks for this module's surface to be focused.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`] or [`StoryError::Shell`].
    pub async fn request_focus(&self) -> Result<(), StoryError> {
        self.controller.focus_module(self.module_path.clone()).await
    }

    /// Asks for the whole story to be focused.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn request_story_focus(&self) -> Result<(), StoryError> {
        self.controller.request_story_focus().await
    }

    /// Reports a run state change of this module. Does not wait.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub fn report_state(&self, state: ModuleState) -> Result<(), StoryError> {
        self.controller.submit(Operation::ModuleStateChanged {
            path: self.module_path.clone(),
            state,
        })
    }

    /// Declares this module finished; the story stops it. Does not wait.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub fn done(&self) -> Result<(), StoryError> {
        let (reply, _) = oneshot::channel();
        self.controller.submit(Operation::StopModule {
            path: self.module_path.clone(),
            reply,
        })
    }

    /// Stops a child module of this module and waits for it.
    ///
    /// # Errors
    ///
    /// As [`StoryController::stop_module`].
    pub async fn stop_module(&self, name: impl Into<String>) -> Result<(), StoryError> {
        self.controller
            .stop_module(self.module_path.child(name))
            .await
    }
}

/// Controls one running module from outside.
#[derive(Debug, Clone)]
pub struct ModuleControllerHandle {
    controller: StoryController,
    module_path: ModulePath,
}

impl ModuleControllerHandle {
    pub(crate) fn new(controller: StoryController, module_path: ModulePath) -> Self {
        Self {
            controller,
            module_path,
        }
    }

    /// Path of the controlled module.
    #[must_use]
    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    /// Stops the module.
    ///
    /// # Errors
    ///
    /// As [`StoryController::stop_module`].
    pub async fn stop(&self) -> Result<(), StoryError> {
        self.controller.stop_module(self.module_path.clone()).await
    }

    /// Focuses the module.
    ///
    /// # Errors
    ///
    /// As [`StoryController::focus_module`].
    pub async fn focus(&self) -> Result<(), StoryError> {
        self.controller.focus_module(self.module_path.clone()).await
    }

    /// Defocuses the module.
    ///
    /// # Errors
    ///
    /// As [`StoryController::defocus_module`].
    pub async fn defocus(&self) -> Result<(), StoryError> {
        self.controller
            .defocus_module(self.module_path.clone())
            .await
    }

    /// Current state plus a subscription to its changes.
    ///
    /// # Errors
    ///
    /// As [`StoryController::watch_module`].
    pub async fn watch(&self) -> Result<ModuleStateWatch, StoryError> {
        self.controller.watch_module(self.module_path.clone()).await
    }
}

/// The story as seen by its shell.
#[derive(Debug, Clone)]
pub struct ShellContext {
    controller: StoryController,
}

impl ShellContext {
    pub(crate) fn new(controller: StoryController) -> Self {
        Self { controller }
    }

    /// Id of the story.
    #[must_use]
    pub fn story_id(&self) -> &str {
        self.controller.story_id()
    }

    /// Relays a focus request from the shell for a module's surface.
    ///
    /// # Errors
    ///
    /// As [`StoryController::focus_module`].
    pub async fn request_focus(&self, module_path: ModulePath) -> Result<(), StoryError> {
        self.controller.focus_module(module_path).await
    }

    /// Relays a defocus request from the shell for a module's surface.
    ///
    /// # Errors
    ///
    /// As [`StoryController::defocus_module`].
    pub async fn request_defocus(&self, module_path: ModulePath) -> Result<(), StoryError> {
        self.controller.defocus_module(module_path).await
    }
}

/// An open connection to a link. Dropping it closes the connection.
#[derive(Debug)]
pub struct LinkConnection {
    controller: StoryController,
    path: LinkPath,
    id: ConnectionId,
    connection_type: LinkConnectionType,
    value: watch::Receiver<serde_json::Value>,
}

impl LinkConnection {
    pub(crate) fn new(
        controller: StoryController,
        path: LinkPath,
        id: ConnectionId,
        connection_type: LinkConnectionType,
        value: watch::Receiver<serde_json::Value>,
    ) -> Self {
        Self {
            controller,
            path,
            id,
            connection_type,
            value,
        }
    }

    /// Path of the connected link.
    #[must_use]
    pub fn path(&self) -> &LinkPath {
        &self.path
    }

    /// Access this connection grants.
    #[must_use]
    pub fn connection_type(&self) -> LinkConnectionType {
        self.connection_type
    }

    /// Current value of the link.
    #[must_use]
    pub fn get(&self) -> serde_json::Value {
        self.value.borrow().clone()
    }

    /// Replaces the link value. Every connection to the link observes the
    /// write once this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::ReadOnlyLink`] for read-only connections and
    /// [`StoryError::LinkNotFound`] if the link was removed by a story stop.
    pub async fn set(&self, value: serde_json::Value) -> Result<(), StoryError> {
        if self.connection_type == LinkConnectionType::ReadOnly {
            return Err(StoryError::ReadOnlyLink(self.path.clone()));
        }
        let (reply, response) = oneshot::channel();
        self.controller.submit(Operation::WriteLink {
            path: self.path.clone(),
            connection: self.id,
            value,
            reply,
        })?;
        response.await.map_err(|_| StoryError::Halted)?
    }

    /// Waits until the value changes and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::LinkNotFound`] once the link is gone.
    pub async fn changed(&mut self) -> Result<serde_json::Value, StoryError> {
        self.value
            .changed()
            .await
            .map_err(|_| StoryError::LinkNotFound(self.path.clone()))?;
        Ok(self.value.borrow_and_update().clone())
    }
}

impl Drop for LinkConnection {
    fn drop(&mut self) {
        // A halted controller has dropped its links already.
        let _ = self.controller.submit(Operation::DisposeLink {
            path: self.path.clone(),
            connection: self.id,
        });
    }
}
