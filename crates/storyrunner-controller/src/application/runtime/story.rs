//! Story lifecycle, story info and ledger synchronization.

use tracing::{debug, info, warn};

use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::PageChange;
use storyrunner_core::link::LinkPath;
use storyrunner_core::module::{
    ModuleData, ModuleIntent, ModulePath, ModuleSource, ModuleSurface, SurfaceRelation,
};
use storyrunner_core::story::{ContextState, StoryContextLog, StoryData, StoryInfo, StorySignal};

use super::{StoryRuntime, detached};
use crate::application::context::ShellContext;
use crate::application::operations::{Operation, StartRequest, StopReason};
use crate::application::page::{LINK_PREFIX, MODULE_PREFIX, STORY_KEY, decode};
use crate::domain::events::{LinkEvent, StoryEvent};

impl StoryRuntime {
    pub(super) async fn restore_story_data(&mut self) {
        match self.page.read_story().await {
            Ok(Some(data)) => self.extra = data.extra,
            Ok(None) => {}
            Err(error) => warn!(%error, "failed to read story record"),
        }
    }

    /// Launches the shell, marks the story running and queues restarts of
    /// every external module the ledger holds.
    pub(super) async fn start(&mut self) -> Result<(), StoryError> {
        // Modules started ahead of the shell may already drive the story
        // to running.
        if self.shell.is_some() {
            return Ok(());
        }
        let shell = self
            .shell_host
            .launch_shell(ShellContext::new(self.handle()?))
            .await?;
        self.shell = Some(shell);
        self.views.attach();
        if let Some(state) = self.story.mark_running() {
            self.announce_story_state(state).await;
        }

        match self.page.read_modules().await {
            Ok(records) => {
                let restarts = records
                    .iter()
                    .filter(|data| {
                        data.module_source == ModuleSource::External && !data.module_stopped
                    })
                    .filter_map(StartRequest::from_module_data);
                for request in restarts.collect::<Vec<_>>() {
                    self.enqueue_followup(Operation::StartModule {
                        request,
                        reply: detached(),
                    });
                }
            }
            Err(error) => warn!(%error, "failed to read module records"),
        }

        self.process_pending_views().await;
        info!("story started");
        Ok(())
    }

    /// Tears the whole story down: modules deepest first, then the shell,
    /// pending surfaces, links and chains.
    pub(super) async fn stop_story(&mut self, reason: StopReason) {
        if !self.story.is_running() && self.graph.is_empty() && self.shell.is_none() {
            debug!(?reason, "story not running");
            return;
        }
        if let Some(state) = self.story.begin_stop() {
            self.announce_story_state(state).await;
        }

        for path in self.graph.running_paths_deepest_first() {
            if let Err(error) = self.teardown_module(&path).await {
                warn!(module = %path, %error, "module teardown failed");
            }
        }
        if let Some(shell) = self.shell.take() {
            shell.terminate().await;
        }
        let released = self.views.release_all();
        if !released.is_empty() {
            debug!(count = released.len(), "released undelivered surfaces");
        }
        self.chains.clear();
        for path in self.links.clear() {
            self.watchers.link(LinkEvent::Removed(path));
        }
        self.graph.drain();

        if let Some(state) = self.story.finish_stop(!reason.halts()) {
            self.announce_story_state(state).await;
        }
        info!(?reason, "story stopped");
    }

    /// Persists a provider-added module and starts it if the story runs.
    pub(super) async fn add_module(
        &mut self,
        parent: ModulePath,
        name: String,
        intent: ModuleIntent,
        relation: SurfaceRelation,
    ) -> Result<(), StoryError> {
        let path = parent.child(name.clone());
        let running = self.story.is_running();
        if running && !parent.is_root() && !self.graph.is_running(&parent) {
            return Err(StoryError::InvalidParent(parent));
        }
        if self.graph.is_occupied(&path) {
            return Err(StoryError::DuplicateModuleName(path));
        }
        let manifest = self.resolver.resolve(&intent).await?;
        let data = ModuleData {
            module_path: path,
            module_url: manifest.url,
            intent: intent.clone(),
            surface: ModuleSurface::InShell(relation),
            module_source: ModuleSource::External,
            module_stopped: false,
        };
        self.page.write_module(&data).await?;
        self.watchers.story(StoryEvent::ModuleAdded(data));

        if running {
            self.start_module(StartRequest {
                parent,
                name,
                intent,
                surface: ModuleSurface::InShell(relation),
                source: ModuleSource::External,
            })
            .await?;
        }
        Ok(())
    }

    /// Persists the first module of a story that was never started, and
    /// the initial value of one of its links.
    pub(super) async fn add_for_create(
        &mut self,
        name: String,
        intent: ModuleIntent,
        link: Option<(String, serde_json::Value)>,
    ) -> Result<(), StoryError> {
        let path = ModulePath::root().child(name);
        let manifest = self.resolver.resolve(&intent).await?;
        let data = ModuleData {
            module_path: path.clone(),
            module_url: manifest.url,
            intent,
            surface: ModuleSurface::InShell(SurfaceRelation::default()),
            module_source: ModuleSource::External,
            module_stopped: false,
        };
        self.page.write_module(&data).await?;
        if let Some((link_name, value)) = link {
            self.page
                .write_link(&LinkPath::new(path, link_name), value)
                .await?;
        }
        self.watchers.story(StoryEvent::ModuleAdded(data));
        Ok(())
    }

    pub(super) fn info(&self) -> StoryInfo {
        StoryInfo {
            story_id: self.story_id.to_string(),
            url: self.story_url.clone(),
            state: self.story.state(),
            last_focus_time: self.last_focus_time,
            extra: self.extra.clone(),
        }
    }

    pub(super) async fn set_info_extra(
        &mut self,
        name: String,
        value: String,
    ) -> Result<(), StoryError> {
        self.extra.insert(name, value);
        self.page.write_story(&self.story_data()).await
    }

    pub(super) async fn log(
        &self,
        signal: StorySignal,
        context: ContextState,
    ) -> Result<(), StoryError> {
        let entry = StoryContextLog {
            signal,
            device_id: self.config.device_id.clone(),
            time: self.clock.now(),
            context,
        };
        self.page.append_context_log(&entry).await
    }

    pub(super) async fn importance(&self, context: &ContextState) -> Result<f32, StoryError> {
        let log = self.page.read_context_log().await?;
        Ok(self.importance.importance(context, &log))
    }

    /// Applies a change observed on the ledger page.
    pub(super) async fn ledger_notification(&mut self, change: PageChange) {
        if self.page.is_stale_echo(&change) {
            debug!(key = %change.key, "ignoring echo of a replaced local write");
            return;
        }
        let PageChange { key, value } = change;
        if key == STORY_KEY {
            match decode::<StoryData>(&key, value) {
                Ok(data) => self.extra = data.extra,
                Err(error) => warn!(%error, "ignoring story record"),
            }
        } else if key.starts_with(MODULE_PREFIX) {
            match decode::<ModuleData>(&key, value) {
                Ok(data) => self.module_record_changed(data).await,
                Err(error) => warn!(%error, "ignoring module record"),
            }
        } else if key.starts_with(LINK_PREFIX) {
            self.link_value_changed(&key, value);
        }
    }

    /// Refreshes a running module's record, or starts an external module
    /// that appeared on the ledger while the story runs.
    async fn module_record_changed(&mut self, data: ModuleData) {
        let path = data.module_path.clone();
        if let Some(record) = self.graph.get_mut(&path) {
            if record.connection.is_some() {
                record.data = data;
            }
            return;
        }
        if !self.story.is_running()
            || data.module_source != ModuleSource::External
            || data.module_stopped
            || self.graph.final_state(&path).is_some()
        {
            return;
        }
        let Some(request) = StartRequest::from_module_data(&data) else {
            return;
        };
        info!(module = %path, "starting module added on the ledger");
        if let Err(error) = self.start_module(request).await {
            warn!(module = %path, %error, "failed to start module added on the ledger");
        }
    }
}
