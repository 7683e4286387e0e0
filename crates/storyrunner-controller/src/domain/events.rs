//! Notifications broadcast to story, module and link watchers.

use tokio::sync::broadcast;

use storyrunner_core::link::LinkPath;
use storyrunner_core::module::{ModuleData, ModulePath, ModuleState};
use storyrunner_core::story::StoryState;

/// Story-level notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryEvent {
    /// The story state was (re)announced.
    StateChanged(StoryState),
    /// A module was added to the story.
    ModuleAdded(ModuleData),
    /// A module asked for the whole story to be focused.
    FocusRequested,
}

/// Module-level notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    /// A module record was created.
    Added(ModuleData),
    /// A module changed run state.
    StateChanged {
        /// Module that changed.
        module_path: ModulePath,
        /// Its new state.
        state: ModuleState,
    },
    /// A module was stopped and removed.
    Removed(ModulePath),
}

/// Requests delivered to the module that embeds another module's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRequest {
    /// The embedded module asked to be focused.
    Focus,
    /// The embedded module asked to be defocused.
    Defocus,
    /// The embedded module stopped; its surface is gone.
    Stopped,
}

/// Link-level notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A link record was created.
    Added(LinkPath),
    /// A link record was removed.
    Removed(LinkPath),
}

/// Broadcast senders for the three watcher sets.
#[derive(Debug, Clone)]
pub struct Watchers {
    story: broadcast::Sender<StoryEvent>,
    modules: broadcast::Sender<ModuleEvent>,
    links: broadcast::Sender<LinkEvent>,
}

impl Watchers {
    /// Creates watcher sets, each buffering up to `capacity` events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (story, _) = broadcast::channel(capacity);
        let (modules, _) = broadcast::channel(capacity);
        let (links, _) = broadcast::channel(capacity);
        Self {
            story,
            modules,
            links,
        }
    }

    // A send only fails when nobody is subscribed.

    /// Notifies story watchers.
    pub fn story(&self, event: StoryEvent) {
        let _ = self.story.send(event);
    }

    /// Notifies module watchers.
    pub fn module(&self, event: ModuleEvent) {
        let _ = self.modules.send(event);
    }

    /// Notifies link watchers.
    pub fn link(&self, event: LinkEvent) {
        let _ = self.links.send(event);
    }

    /// Subscribes to story events.
    #[must_use]
    pub fn subscribe_story(&self) -> broadcast::Receiver<StoryEvent> {
        self.story.subscribe()
    }

    /// Subscribes to module events.
    #[must_use]
    pub fn subscribe_modules(&self) -> broadcast::Receiver<ModuleEvent> {
        self.modules.subscribe()
    }

    /// Subscribes to link events.
    #[must_use]
    pub fn subscribe_links(&self) -> broadcast::Receiver<LinkEvent> {
        self.links.subscribe()
    }
}
