//! Public handle of a story controller.
//!
//! The handle is cheap to clone. Each method wraps its request in an
//! operation, submits it to the story's queue and awaits the reply.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use storyrunner_core::clock::{Clock, SystemClock};
use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::LedgerPage;
use storyrunner_core::link::{LinkConnectionType, LinkPath};
use storyrunner_core::module::{
    ModuleData, ModuleIntent, ModulePath, ModuleSource, ModuleSurface, SurfaceHandle,
    SurfaceRelation,
};
use storyrunner_core::story::{ContextState, StoryInfo, StorySignal, StoryState};

use super::config::ControllerConfig;
use super::context::{LinkConnection, ModuleControllerHandle};
use super::notification_bridge;
use super::operations::{ContainerRequest, Envelope, Operation, Reply, StartRequest, StopReason};
use super::ports::{
    ImportancePolicy, ModuleLauncher, ModuleResolver, StoryShellHost, TopicMatchImportance,
    UrlResolver,
};
use super::runtime::StoryRuntime;
use super::watch::{ActiveLinks, ActiveModules, EmbeddedModule, ModuleStateWatch, StoryWatch};

/// Collaborators a story controller drives.
#[derive(Clone)]
pub struct StoryCollaborators {
    /// The story's ledger page.
    pub ledger: Arc<dyn LedgerPage>,
    /// Launches module binaries.
    pub launcher: Arc<dyn ModuleLauncher>,
    /// Launches the story shell.
    pub shell_host: Arc<dyn StoryShellHost>,
    /// Resolves intents to manifests.
    pub resolver: Arc<dyn ModuleResolver>,
    /// Scores the story; defaults to [`TopicMatchImportance`] over the
    /// configured topics.
    pub importance: Option<Arc<dyn ImportancePolicy>>,
    /// Source of timestamps.
    pub clock: Arc<dyn Clock>,
}

impl StoryCollaborators {
    /// Collaborators with the URL resolver, the default importance policy
    /// and the system clock.
    pub fn new(
        ledger: Arc<dyn LedgerPage>,
        launcher: Arc<dyn ModuleLauncher>,
        shell_host: Arc<dyn StoryShellHost>,
    ) -> Self {
        Self {
            ledger,
            launcher,
            shell_host,
            resolver: Arc::new(UrlResolver),
            importance: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the importance policy.
    #[must_use]
    pub fn with_importance(mut self, importance: Arc<dyn ImportancePolicy>) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Handle to a running story controller.
#[derive(Clone)]
pub struct StoryController {
    story_id: Arc<str>,
    sender: mpsc::UnboundedSender<Envelope>,
}

impl std::fmt::Debug for StoryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryController")
            .field("story_id", &self.story_id)
            .field("halted", &self.sender.is_closed())
            .finish()
    }
}

impl StoryController {
    /// Spawns the controller of story `story_id` on the current tokio
    /// runtime and returns its handle.
    ///
    /// The controller runs until a halting stop completes or every handle,
    /// including those held by running modules, is dropped.
    pub fn spawn(
        story_id: impl Into<String>,
        collaborators: StoryCollaborators,
        config: ControllerConfig,
    ) -> Self {
        let story_id: Arc<str> = Arc::from(story_id.into());
        let (sender, inbox) = mpsc::unbounded_channel();
        let controller = Self {
            story_id: Arc::clone(&story_id),
            sender,
        };

        let importance = collaborators.importance.clone().unwrap_or_else(|| {
            Arc::new(TopicMatchImportance::new(config.importance_topics.clone()))
        });
        // Subscribe before anything can be written so no change is missed.
        let changes = collaborators.ledger.watch();
        let bridge = notification_bridge::spawn(controller.sender.downgrade(), changes);
        let runtime = StoryRuntime::new(
            Arc::clone(&story_id),
            collaborators,
            importance,
            config,
            controller.sender.downgrade(),
            inbox,
            bridge,
        );
        tokio::spawn(runtime.run());

        info!(story_id = %story_id, "story controller spawned");
        controller
    }

    pub(crate) fn from_sender(story_id: Arc<str>, sender: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { story_id, sender }
    }

    /// Id of the story.
    #[must_use]
    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    /// Returns `true` once the controller accepts no more operations.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.sender.is_closed()
    }

    /// Enqueues an operation without waiting for it.
    pub(crate) fn submit(&self, operation: Operation) -> Result<(), StoryError> {
        self.sender
            .send(Envelope::new(operation))
            .map_err(|_| StoryError::Halted)
    }

    async fn call<T>(
        &self,
        operation: impl FnOnce(Reply<T>) -> Operation,
    ) -> Result<T, StoryError> {
        let (reply, response) = oneshot::channel();
        self.submit(operation(reply))?;
        response.await.map_err(|_| StoryError::Halted)?
    }

    /// Launches the shell, restarts externally added modules and marks the
    /// story running. Does nothing if it already runs.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Shell`] if the shell fails to launch.
    pub async fn start(&self) -> Result<(), StoryError> {
        self.call(|reply| Operation::Start { reply }).await
    }

    /// Stops every module, children first, then the shell.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn stop(&self) -> Result<(), StoryError> {
        self.stop_with(StopReason::Stop).await
    }

    /// Stops the story and halts the controller ahead of deletion.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller was already halted.
    pub async fn stop_for_delete(&self) -> Result<(), StoryError> {
        self.stop_with(StopReason::Delete).await
    }

    /// Stops the story and halts the controller at runner shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller was already halted.
    pub async fn stop_for_teardown(&self) -> Result<(), StoryError> {
        self.stop_with(StopReason::Teardown).await
    }

    async fn stop_with(&self, reason: StopReason) -> Result<(), StoryError> {
        self.call(|reply| Operation::Stop { reason, reply }).await
    }

    /// Persists a module added by the provider and, if the story runs,
    /// starts it in the shell.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the record cannot be written, or any
    /// start error.
    pub async fn add_module(
        &self,
        parent: ModulePath,
        name: impl Into<String>,
        intent: ModuleIntent,
        relation: SurfaceRelation,
    ) -> Result<(), StoryError> {
        let name = name.into();
        self.call(|reply| Operation::AddModule {
            parent,
            name,
            intent,
            relation,
            reply,
        })
        .await
    }

    /// Persists the first module of a story that was not started yet, and
    /// optionally the initial value of one of its links.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if a record cannot be written.
    pub async fn add_for_create(
        &self,
        name: impl Into<String>,
        intent: ModuleIntent,
        link: Option<(String, serde_json::Value)>,
    ) -> Result<(), StoryError> {
        let name = name.into();
        self.call(|reply| Operation::AddForCreate {
            name,
            intent,
            link,
            reply,
        })
        .await
    }

    /// Starts a module. Returns its surface when `surface` is
    /// [`ModuleSurface::Embedded`].
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::InvalidParent`], [`StoryError::DuplicateModuleName`],
    /// [`StoryError::ManifestResolutionFailure`] or [`StoryError::LaunchFailure`].
    pub async fn start_module(
        &self,
        parent: ModulePath,
        name: impl Into<String>,
        intent: ModuleIntent,
        surface: ModuleSurface,
        source: ModuleSource,
    ) -> Result<Option<SurfaceHandle>, StoryError> {
        let request = StartRequest {
            parent,
            name: name.into(),
            intent,
            surface,
            source,
        };
        self.call(|reply| Operation::StartModule { request, reply }).await
    }

    /// Starts a module whose surface is returned to the caller instead of
    /// the shell. Focus and defocus requests for the module, and its stop,
    /// arrive on the returned watcher.
    ///
    /// # Errors
    ///
    /// As [`StoryController::start_module`].
    pub async fn embed_module(
        &self,
        parent: ModulePath,
        name: impl Into<String>,
        intent: ModuleIntent,
    ) -> Result<EmbeddedModule, StoryError> {
        let request = StartRequest {
            parent,
            name: name.into(),
            intent,
            surface: ModuleSurface::Embedded,
            source: ModuleSource::Internal,
        };
        self.call(|reply| Operation::EmbedModule { request, reply }).await
    }

    /// Starts every node of a container and hands the container to the
    /// shell.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::InvalidParent`] or [`StoryError::Shell`].
    pub async fn start_container_in_shell(
        &self,
        request: ContainerRequest,
    ) -> Result<(), StoryError> {
        self.call(|reply| Operation::StartContainer { request, reply }).await
    }

    /// Stops a module and its descendants, children first.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`], [`StoryError::AlreadyStopped`] or
    /// [`StoryError::Timeout`] if a module had to be killed.
    pub async fn stop_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.call(|reply| Operation::StopModule { path, reply }).await
    }

    /// Focuses a module's surface.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`] or [`StoryError::Shell`].
    pub async fn focus_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.call(|reply| Operation::FocusModule { path, reply }).await
    }

    /// Removes focus from a module's surface.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`] or [`StoryError::Shell`].
    pub async fn defocus_module(&self, path: ModulePath) -> Result<(), StoryError> {
        self.call(|reply| Operation::DefocusModule { path, reply }).await
    }

    /// Asks story watchers to focus the story.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn request_story_focus(&self) -> Result<(), StoryError> {
        self.call(|reply| Operation::RequestStoryFocus { reply }).await
    }

    /// Opens a connection to a link, creating the link if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn connect_link(
        &self,
        path: LinkPath,
        connection_type: LinkConnectionType,
    ) -> Result<LinkConnection, StoryError> {
        self.call(|reply| Operation::ConnectLink {
            path,
            connection_type,
            reply,
        })
        .await
    }

    /// Provider-side connection to a module's link.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn get_link(
        &self,
        module_path: ModulePath,
        link_name: impl Into<String>,
    ) -> Result<LinkConnection, StoryError> {
        self.connect_link(
            LinkPath::new(module_path, link_name),
            LinkConnectionType::ReadWrite,
        )
        .await
    }

    /// Resolves a chain slot of a module to a link path.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn link_path_for_chain_key(
        &self,
        module_path: ModulePath,
        key: impl Into<String>,
    ) -> Result<LinkPath, StoryError> {
        let key = key.into();
        self.call(|reply| Operation::LinkPathForChainKey {
            module_path,
            key,
            reply,
        })
        .await
    }

    /// Story info.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn info(&self) -> Result<StoryInfo, StoryError> {
        self.call(|reply| Operation::GetInfo { reply }).await
    }

    /// Current story state.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn state(&self) -> Result<StoryState, StoryError> {
        Ok(self.info().await?.state)
    }

    /// Returns `true` while the story runs.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn is_running(&self) -> Result<bool, StoryError> {
        Ok(self.state().await? == StoryState::Running)
    }

    /// Sets and persists a story annotation.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the story record cannot be written.
    pub async fn set_info_extra(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StoryError> {
        let (name, value) = (name.into(), value.into());
        self.call(|reply| Operation::SetInfoExtra { name, value, reply }).await
    }

    /// Every module record in the ledger, running or not.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the records cannot be read.
    pub async fn modules(&self) -> Result<Vec<ModuleData>, StoryError> {
        self.call(|reply| Operation::GetModules { reply }).await
    }

    /// Running modules plus a subscription to module events.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn active_modules(&self) -> Result<ActiveModules, StoryError> {
        self.call(|reply| Operation::GetActiveModules { reply }).await
    }

    /// Live links plus a subscription to link events.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn active_links(&self) -> Result<ActiveLinks, StoryError> {
        self.call(|reply| Operation::GetActiveLinks { reply }).await
    }

    /// Current story state plus a subscription to story events.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn watch(&self) -> Result<StoryWatch, StoryError> {
        self.call(|reply| Operation::WatchStory { reply }).await
    }

    /// Handle controlling one running module.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`] if no module runs at `path`.
    pub async fn module_controller(
        &self,
        path: ModulePath,
    ) -> Result<ModuleControllerHandle, StoryError> {
        self.call(|reply| Operation::GetModuleController { path, reply }).await
    }

    /// Run state of one module plus a subscription to its changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::NotRunning`] if the story has no record of the
    /// module.
    pub async fn watch_module(&self, path: ModulePath) -> Result<ModuleStateWatch, StoryError> {
        self.call(|reply| Operation::WatchModule { path, reply }).await
    }

    /// Persists a context log entry stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the entry cannot be written.
    pub async fn log(&self, signal: StorySignal, context: ContextState) -> Result<(), StoryError> {
        self.call(|reply| Operation::Log {
            signal,
            context,
            reply,
        })
        .await
    }

    /// Scores the story in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Ledger`] if the context log cannot be read.
    pub async fn importance(&self, context: ContextState) -> Result<f32, StoryError> {
        self.call(|reply| Operation::GetImportance { context, reply }).await
    }

    /// Completes once every operation submitted before it has completed.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::Halted`] if the controller is gone.
    pub async fn sync(&self) -> Result<(), StoryError> {
        self.call(|reply| Operation::Sync { reply }).await
    }
}
