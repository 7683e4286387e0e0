//! Module start, stop, state and focus operations.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use storyrunner_core::error::StoryError;
use storyrunner_core::module::{
    ModuleData, ModuleIntent, ModulePath, ModuleSource, ModuleState, ModuleSurface, SurfaceHandle,
};

use super::{ModuleConnection, StoryRuntime, SurfaceRoute, detached};
use crate::application::context::{ModuleContext, ModuleControllerHandle};
use crate::application::operations::{Operation, StartRequest};
use crate::application::watch::{EmbedWatcher, EmbeddedModule, ModuleStateWatch};
use crate::domain::events::{EmbedRequest, LinkEvent, ModuleEvent};
use crate::domain::shell_tracker::PendingView;

impl StoryRuntime {
    /// Starts one module. Returns the surface of an embedded module.
    pub(super) async fn start_module(
        &mut self,
        request: StartRequest,
    ) -> Result<Option<SurfaceHandle>, StoryError> {
        let path = request.module_path();
        if !request.parent.is_root() && !self.graph.is_running(&request.parent) {
            return Err(StoryError::InvalidParent(request.parent));
        }
        if self.graph.is_occupied(&path) {
            return Err(StoryError::DuplicateModuleName(path));
        }
        let manifest = self.resolver.resolve(&request.intent).await?;
        let context = ModuleContext::new(self.handle()?, path.clone());

        let data = ModuleData {
            module_path: path.clone(),
            module_url: manifest.url.clone(),
            intent: request.intent,
            surface: request.surface,
            module_source: request.source,
            module_stopped: false,
        };
        self.write_module_behind(&data).await;

        self.story.note_module_started(&path);
        if self.story.first_module_path() == Some(&path) {
            self.story_url = Some(data.module_url.clone());
        }
        self.graph.insert_starting(data.clone());
        self.watchers.module(ModuleEvent::Added(data.clone()));
        self.init_chain(&path, &data.intent).await;

        let launched = match self.launcher.launch(&manifest, context).await {
            Ok(launched) => launched,
            Err(error) => {
                warn!(module = %path, %error, "module launch failed");
                self.set_module_state(&path, ModuleState::Error).await;
                self.graph.discard_failed(&path);
                self.chains.remove(&path);
                self.purge_unreferenced_links();
                self.watchers.module(ModuleEvent::Removed(path.clone()));
                return Err(match error {
                    StoryError::LaunchFailure { .. } => error,
                    other => StoryError::LaunchFailure {
                        path,
                        reason: other.to_string(),
                    },
                });
            }
        };

        let route = match data.surface {
            ModuleSurface::InShell(_) => SurfaceRoute::Shell,
            ModuleSurface::Embedded | ModuleSurface::Headless => SurfaceRoute::Unrouted,
        };
        self.graph.connect(
            &path,
            ModuleConnection {
                instance: launched.instance,
                route,
            },
        );
        self.announce_module_state(&path, ModuleState::Running).await;
        info!(module = %path, url = %manifest.url, "module running");

        let embedded = match data.surface {
            ModuleSurface::InShell(relation) => {
                if let Some(surface) = launched.surface {
                    self.views.add_pending(PendingView {
                        module_path: path.clone(),
                        surface,
                        relation,
                    });
                    self.process_pending_views().await;
                }
                None
            }
            ModuleSurface::Embedded => launched.surface,
            ModuleSurface::Headless => None,
        };

        for child in manifest.children {
            self.enqueue_followup(Operation::StartModule {
                request: StartRequest {
                    parent: path.clone(),
                    name: child.name,
                    intent: child.intent,
                    surface: child.surface,
                    source: ModuleSource::Internal,
                },
                reply: detached(),
            });
        }
        Ok(embedded)
    }

    /// Starts an embedded module and routes its focus requests and its stop
    /// to the returned watcher.
    pub(super) async fn embed_module(
        &mut self,
        request: StartRequest,
    ) -> Result<EmbeddedModule, StoryError> {
        let path = request.module_path();
        let request = StartRequest {
            surface: ModuleSurface::Embedded,
            ..request
        };
        let surface = self.start_module(request).await?;
        let (sender, requests) = mpsc::unbounded_channel();
        self.route_surface(&path, SurfaceRoute::Embedder(sender));
        Ok(EmbeddedModule {
            surface,
            watcher: EmbedWatcher::new(path, requests),
        })
    }

    pub(super) fn route_surface(&mut self, path: &ModulePath, route: SurfaceRoute) {
        if let Some(connection) = self
            .graph
            .get_mut(path)
            .and_then(|record| record.connection.as_mut())
        {
            connection.route = route;
        }
    }

    /// Stops a module after all of its running descendants, deepest first.
    pub(super) async fn stop_module(&mut self, path: ModulePath) -> Result<(), StoryError> {
        if !self.graph.is_running(&path) {
            return Err(if self.graph.is_retired(&path) {
                StoryError::AlreadyStopped(path)
            } else {
                StoryError::NotRunning(path)
            });
        }

        let stopped = self.graph.get_mut(&path).map(|record| {
            record.data.module_stopped = true;
            record.data.clone()
        });
        if let Some(data) = stopped {
            self.write_module_behind(&data).await;
        }

        let mut outcome = Ok(());
        for descendant in self.graph.running_descendants(&path) {
            if let Err(error) = self.teardown_module(&descendant).await {
                outcome = outcome.and(Err(error));
            }
        }
        if let Err(error) = self.teardown_module(&path).await {
            outcome = outcome.and(Err(error));
        }
        outcome
    }

    /// Stops one running module without looking at its descendants.
    ///
    /// A module that misses the stop deadline is killed and still ends up
    /// stopped; the timeout is reported to the caller.
    pub(super) async fn teardown_module(&mut self, path: &ModulePath) -> Result<(), StoryError> {
        self.set_module_state(path, ModuleState::Stopping).await;
        let Some(connection) = self.graph.take_connection(path) else {
            return Ok(());
        };

        let result =
            match tokio::time::timeout(self.config.module_stop_timeout, connection.instance.stop())
                .await
            {
                Ok(()) => Ok(()),
                Err(_) => {
                    let timeout_ms = self.config.module_stop_timeout_ms();
                    warn!(module = %path, timeout_ms, "module missed stop deadline, killing it");
                    connection.instance.kill();
                    Err(StoryError::Timeout {
                        path: path.clone(),
                        timeout_ms,
                    })
                }
            };
        let ModuleConnection { instance, route } = connection;
        drop(instance);

        self.views.disconnect(path);
        self.set_module_state(path, ModuleState::Stopped).await;
        if let SurfaceRoute::Embedder(embedder) = route {
            // The embedder may have dropped its watcher.
            let _ = embedder.send(EmbedRequest::Stopped);
        }
        self.graph.retire(path);
        self.chains.remove(path);
        self.purge_unreferenced_links();
        self.watchers.module(ModuleEvent::Removed(path.clone()));
        debug!(module = %path, "module stopped");
        result
    }

    /// Applies a run state reported for a module.
    pub(super) async fn set_module_state(&mut self, path: &ModulePath, state: ModuleState) {
        if self.graph.set_state(path, state) {
            self.announce_module_state(path, state).await;
        }
    }

    async fn announce_module_state(&mut self, path: &ModulePath, state: ModuleState) {
        self.watchers.module(ModuleEvent::StateChanged {
            module_path: path.clone(),
            state,
        });
        if let Some(story_state) = self.story.on_module_state_change(path, state) {
            self.announce_story_state(story_state).await;
        }
    }

    pub(super) async fn focus_module(&mut self, path: ModulePath) -> Result<(), StoryError> {
        self.route_request(&path, EmbedRequest::Focus).await?;
        self.last_focus_time = Some(self.clock.now());
        Ok(())
    }

    pub(super) async fn defocus_module(&mut self, path: ModulePath) -> Result<(), StoryError> {
        self.route_request(&path, EmbedRequest::Defocus).await
    }

    /// Sends a focus or defocus request to whoever holds the module's surface.
    async fn route_request(
        &self,
        path: &ModulePath,
        request: EmbedRequest,
    ) -> Result<(), StoryError> {
        let Some(connection) = self
            .graph
            .find_connection(path)
            .and_then(|record| record.connection.as_ref())
        else {
            return Err(StoryError::NotRunning(path.clone()));
        };
        match &connection.route {
            SurfaceRoute::Shell => {
                let Some(shell) = &self.shell else {
                    return Ok(());
                };
                match request {
                    EmbedRequest::Focus => shell.focus_surface(path).await,
                    _ => shell.defocus_surface(path).await,
                }
            }
            SurfaceRoute::Embedder(embedder) => {
                if embedder.send(request).is_err() {
                    debug!(module = %path, "embedder no longer watches its module");
                }
                Ok(())
            }
            SurfaceRoute::Unrouted => {
                debug!(module = %path, ?request, "module surface has no holder");
                Ok(())
            }
        }
    }

    pub(super) fn module_controller(
        &self,
        path: ModulePath,
    ) -> Result<ModuleControllerHandle, StoryError> {
        if !self.graph.is_running(&path) {
            return Err(StoryError::NotRunning(path));
        }
        Ok(ModuleControllerHandle::new(self.handle()?, path))
    }

    pub(super) fn watch_module(&self, path: ModulePath) -> Result<ModuleStateWatch, StoryError> {
        let state = match self.graph.get(&path) {
            Some(record) => record.state,
            None => match self.graph.final_state(&path) {
                Some(state) => state,
                None => return Err(StoryError::NotRunning(path)),
            },
        };
        Ok(ModuleStateWatch::new(
            path,
            state,
            self.watchers.subscribe_modules(),
        ))
    }

    /// Creates the module's chain and the links its JSON slots seed.
    /// Persisted link values win over the seeds.
    async fn init_chain(&mut self, path: &ModulePath, intent: &ModuleIntent) {
        let (_, seeds) = self.chains.get_or_create(path, intent);
        for seed in seeds {
            let Some(initial) = seed.initial else {
                continue;
            };
            if self.links.contains(&seed.link_path) {
                continue;
            }
            let value = match self.read_persisted_link(&seed.link_path).await {
                Some(value) => value,
                None => {
                    let written = self.page.write_link(&seed.link_path, initial.clone()).await;
                    if let Err(error) = written {
                        warn!(link = %seed.link_path, %error, "failed to persist link seed");
                    }
                    initial
                }
            };
            self.links.create(seed.link_path.clone(), value);
            self.watchers.link(LinkEvent::Added(seed.link_path));
        }
    }

    pub(super) fn purge_unreferenced_links(&mut self) {
        for path in self.links.purge_unreferenced(&self.chains) {
            self.watchers.link(LinkEvent::Removed(path));
        }
    }

    pub(super) async fn write_module_behind(&self, data: &ModuleData) {
        if let Err(error) = self.page.write_module(data).await {
            warn!(module = %data.module_path, %error, "failed to persist module record");
        }
    }
}
