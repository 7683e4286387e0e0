//! Operations accepted by the story runtime.
//!
//! Every request, whether it comes from a provider, a running module or a
//! ledger notification, becomes one of these and runs on the story's queue.

use tokio::sync::oneshot;
use uuid::Uuid;

use storyrunner_core::error::StoryError;
use storyrunner_core::ledger::PageChange;
use storyrunner_core::link::{LinkConnectionType, LinkPath};
use storyrunner_core::module::{
    ModuleData, ModuleIntent, ModulePath, ModuleSource, ModuleState, ModuleSurface,
    SurfaceHandle, SurfaceRelation,
};
use storyrunner_core::story::{ContextState, StoryInfo, StorySignal};

use super::context::{LinkConnection, ModuleControllerHandle};
use super::watch::{ActiveLinks, ActiveModules, EmbeddedModule, ModuleStateWatch, StoryWatch};
use crate::domain::container::{ContainerLayout, ContainerNode, ContainerRelation};
use crate::domain::link_registry::ConnectionId;

/// Reply channel of an operation.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, StoryError>>;

/// Why the story is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ordinary stop; the story can be started again.
    Stop,
    /// The story is about to be deleted.
    Delete,
    /// The runner is shutting down.
    Teardown,
}

impl StopReason {
    /// Returns `true` if no operation may run after the stop.
    #[must_use]
    pub fn halts(self) -> bool {
        !matches!(self, Self::Stop)
    }
}

/// A request to start one module.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// Parent of the new module; the story root for top-level modules.
    pub parent: ModulePath,
    /// Name of the new module below `parent`.
    pub name: String,
    /// What to run.
    pub intent: ModuleIntent,
    /// Where its surface goes.
    pub surface: ModuleSurface,
    /// Who asked.
    pub source: ModuleSource,
}

impl StartRequest {
    /// Path the module will have.
    #[must_use]
    pub fn module_path(&self) -> ModulePath {
        self.parent.child(self.name.clone())
    }

    /// Rebuilds the request that produced a persisted module record.
    /// Returns `None` for a record without a name.
    #[must_use]
    pub fn from_module_data(data: &ModuleData) -> Option<Self> {
        let name = data.module_path.name()?.to_owned();
        Some(Self {
            parent: data.module_path.parent(),
            name,
            intent: data.intent.clone(),
            surface: data.surface,
            source: data.module_source,
        })
    }
}

/// A container to start in the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRequest {
    /// Module owning the container.
    pub parent: ModulePath,
    /// Container name.
    pub name: String,
    /// Region layouts.
    pub layout: Vec<ContainerLayout>,
    /// Node relations.
    pub relationships: Vec<ContainerRelation>,
    /// Modules to start, one per node.
    pub nodes: Vec<ContainerNode>,
}

/// Unit of work on the story queue.
pub(crate) enum Operation {
    Start {
        reply: Reply<()>,
    },
    Stop {
        reason: StopReason,
        reply: Reply<()>,
    },
    AddModule {
        parent: ModulePath,
        name: String,
        intent: ModuleIntent,
        relation: SurfaceRelation,
        reply: Reply<()>,
    },
    AddForCreate {
        name: String,
        intent: ModuleIntent,
        link: Option<(String, serde_json::Value)>,
        reply: Reply<()>,
    },
    StartModule {
        request: StartRequest,
        reply: Reply<Option<SurfaceHandle>>,
    },
    EmbedModule {
        request: StartRequest,
        reply: Reply<EmbeddedModule>,
    },
    StartContainer {
        request: ContainerRequest,
        reply: Reply<()>,
    },
    StopModule {
        path: ModulePath,
        reply: Reply<()>,
    },
    ModuleStateChanged {
        path: ModulePath,
        state: ModuleState,
    },
    FocusModule {
        path: ModulePath,
        reply: Reply<()>,
    },
    DefocusModule {
        path: ModulePath,
        reply: Reply<()>,
    },
    RequestStoryFocus {
        reply: Reply<()>,
    },
    ConnectLink {
        path: LinkPath,
        connection_type: LinkConnectionType,
        reply: Reply<LinkConnection>,
    },
    WriteLink {
        path: LinkPath,
        connection: ConnectionId,
        value: serde_json::Value,
        reply: Reply<()>,
    },
    DisposeLink {
        path: LinkPath,
        connection: ConnectionId,
    },
    LinkPathForChainKey {
        module_path: ModulePath,
        key: String,
        reply: Reply<LinkPath>,
    },
    GetInfo {
        reply: Reply<StoryInfo>,
    },
    SetInfoExtra {
        name: String,
        value: String,
        reply: Reply<()>,
    },
    GetModules {
        reply: Reply<Vec<ModuleData>>,
    },
    GetActiveModules {
        reply: Reply<ActiveModules>,
    },
    GetActiveLinks {
        reply: Reply<ActiveLinks>,
    },
    WatchStory {
        reply: Reply<StoryWatch>,
    },
    GetModuleController {
        path: ModulePath,
        reply: Reply<ModuleControllerHandle>,
    },
    WatchModule {
        path: ModulePath,
        reply: Reply<ModuleStateWatch>,
    },
    Log {
        signal: StorySignal,
        context: ContextState,
        reply: Reply<()>,
    },
    GetImportance {
        context: ContextState,
        reply: Reply<f32>,
    },
    Sync {
        reply: Reply<()>,
    },
    LedgerNotification {
        change: PageChange,
    },
}

impl Operation {
    /// Name recorded on the operation's span.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { reason, .. } => match reason {
                StopReason::Stop => "stop",
                StopReason::Delete => "stop_for_delete",
                StopReason::Teardown => "stop_for_teardown",
            },
            Self::AddModule { .. } => "add_module",
            Self::AddForCreate { .. } => "add_for_create",
            Self::StartModule { .. } => "start_module",
            Self::EmbedModule { .. } => "embed_module",
            Self::StartContainer { .. } => "start_container_in_shell",
            Self::StopModule { .. } => "stop_module",
            Self::ModuleStateChanged { .. } => "module_state_changed",
            Self::FocusModule { .. } => "focus_module",
            Self::DefocusModule { .. } => "defocus_module",
            Self::RequestStoryFocus { .. } => "request_story_focus",
            Self::ConnectLink { .. } => "connect_link",
            Self::WriteLink { .. } => "write_link",
            Self::DisposeLink { .. } => "dispose_link",
            Self::LinkPathForChainKey { .. } => "link_path_for_chain_key",
            Self::GetInfo { .. } => "get_info",
            Self::SetInfoExtra { .. } => "set_info_extra",
            Self::GetModules { .. } => "get_modules",
            Self::GetActiveModules { .. } => "get_active_modules",
            Self::GetActiveLinks { .. } => "get_active_links",
            Self::WatchStory { .. } => "watch_story",
            Self::GetModuleController { .. } => "get_module_controller",
            Self::WatchModule { .. } => "watch_module",
            Self::Log { .. } => "log",
            Self::GetImportance { .. } => "get_importance",
            Self::Sync { .. } => "sync",
            Self::LedgerNotification { .. } => "ledger_notification",
        }
    }
}

/// An operation plus the id tying its log lines together.
pub(crate) struct Envelope {
    pub correlation_id: Uuid,
    pub operation: Operation,
}

impl Envelope {
    pub(crate) fn new(operation: Operation) -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            operation,
        }
    }
}
