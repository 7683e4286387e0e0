//! Story Runner Controller: orchestration of one running story.
//!
//! A story controller owns the modules, links, chains and shell surfaces of
//! one story. Every mutating request is serialized through a single
//! operation queue, so the registries in [`domain`] never see two requests
//! interleave.

pub mod application;
pub mod domain;

pub use application::config::ControllerConfig;
pub use application::context::{LinkConnection, ModuleContext, ModuleControllerHandle, ShellContext};
pub use application::controller::{StoryCollaborators, StoryController};
pub use application::operations::{ContainerRequest, StartRequest, StopReason};
pub use application::ports::{
    ImportancePolicy, LaunchedModule, ModuleInstance, ModuleLauncher, ModuleResolver, StoryShell,
    StoryShellHost, TopicMatchImportance, UrlResolver,
};
pub use application::watch::{
    ActiveLinks, ActiveModules, EmbedWatcher, EmbeddedModule, ModuleStateWatch, StoryWatch,
};
