//! Snapshots paired with event subscriptions.
//!
//! Each snapshot is taken on the story queue together with its subscription,
//! so no event is missed or double-counted between the two.

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use storyrunner_core::link::LinkPath;
use storyrunner_core::module::{ModuleData, ModulePath, ModuleState, SurfaceHandle};
use storyrunner_core::story::StoryState;

use crate::domain::events::{EmbedRequest, LinkEvent, ModuleEvent, StoryEvent};

/// Current story state plus subsequent story events.
#[derive(Debug)]
pub struct StoryWatch {
    /// State when the watch was taken.
    pub state: StoryState,
    /// Events after that point.
    pub events: broadcast::Receiver<StoryEvent>,
}

impl StoryWatch {
    /// Waits for the next story state. Returns `None` once the controller is
    /// gone.
    pub async fn next_state(&mut self) -> Option<StoryState> {
        loop {
            match self.events.recv().await {
                Ok(StoryEvent::StateChanged(state)) => {
                    self.state = state;
                    return Some(state);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "story watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Running modules plus subsequent module events.
#[derive(Debug)]
pub struct ActiveModules {
    /// Records of the modules running when the snapshot was taken.
    pub modules: Vec<ModuleData>,
    /// Events after that point.
    pub events: broadcast::Receiver<ModuleEvent>,
}

/// Live links plus subsequent link events.
#[derive(Debug)]
pub struct ActiveLinks {
    /// Paths of the links live when the snapshot was taken.
    pub links: Vec<LinkPath>,
    /// Events after that point.
    pub events: broadcast::Receiver<LinkEvent>,
}

/// Run state of one module plus its subsequent changes.
#[derive(Debug)]
pub struct ModuleStateWatch {
    module_path: ModulePath,
    state: ModuleState,
    events: broadcast::Receiver<ModuleEvent>,
}

impl ModuleStateWatch {
    pub(crate) fn new(
        module_path: ModulePath,
        state: ModuleState,
        events: broadcast::Receiver<ModuleEvent>,
    ) -> Self {
        Self {
            module_path,
            state,
            events,
        }
    }

    /// Last known state.
    #[must_use]
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Waits for the module's next state change. Returns `None` after the
    /// module was removed or the controller is gone.
    pub async fn changed(&mut self) -> Option<ModuleState> {
        loop {
            match self.events.recv().await {
                Ok(ModuleEvent::StateChanged { module_path, state })
                    if module_path == self.module_path =>
                {
                    self.state = state;
                    return Some(state);
                }
                Ok(ModuleEvent::Removed(module_path)) if module_path == self.module_path => {
                    return None;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(module = %self.module_path, skipped, "module watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Focus requests and the stop of one embedded module, delivered to the
/// module that embeds it.
#[derive(Debug)]
pub struct EmbedWatcher {
    module_path: ModulePath,
    requests: mpsc::UnboundedReceiver<EmbedRequest>,
}

impl EmbedWatcher {
    pub(crate) fn new(
        module_path: ModulePath,
        requests: mpsc::UnboundedReceiver<EmbedRequest>,
    ) -> Self {
        Self {
            module_path,
            requests,
        }
    }

    /// The embedded module.
    #[must_use]
    pub fn module_path(&self) -> &ModulePath {
        &self.module_path
    }

    /// Waits for the next request. Returns `None` after
    /// [`EmbedRequest::Stopped`] was delivered or the controller is gone.
    pub async fn next(&mut self) -> Option<EmbedRequest> {
        self.requests.recv().await
    }
}

/// An embedded module's surface and the watcher its embedder listens on.
#[derive(Debug)]
pub struct EmbeddedModule {
    /// Surface to place inside the embedder's own; `None` if the module
    /// has none.
    pub surface: Option<SurfaceHandle>,
    /// Requests for the embedder.
    pub watcher: EmbedWatcher,
}
