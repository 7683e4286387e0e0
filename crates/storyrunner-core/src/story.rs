//! Story-level records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::ModuleState;

/// Aggregate run state of a story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryState {
    /// Never started in this session.
    #[default]
    Initial,
    /// Running.
    Running,
    /// A stop is in progress.
    Stopping,
    /// Stopped.
    Stopped,
    /// The root module failed.
    Error,
}

impl StoryState {
    /// Story state implied by a run state of the root module. `Starting`
    /// implies no change.
    #[must_use]
    pub fn from_root_module(state: ModuleState) -> Option<Self> {
        match state {
            ModuleState::Starting => None,
            ModuleState::Running => Some(Self::Running),
            ModuleState::Stopping => Some(Self::Stopping),
            ModuleState::Stopped => Some(Self::Stopped),
            ModuleState::Error => Some(Self::Error),
        }
    }
}

/// Persisted story-wide data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryData {
    /// Story identifier.
    pub story_id: String,
    /// Last story state written behind by the controller.
    pub state: StoryState,
    /// Free-form key-value annotations.
    pub extra: BTreeMap<String, String>,
}

/// Read-only view of a story returned to providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryInfo {
    /// Story identifier.
    pub story_id: String,
    /// URL of the first module started in the story, if any.
    pub url: Option<String>,
    /// Current aggregate state.
    pub state: StoryState,
    /// Last time a module of the story received focus.
    pub last_focus_time: Option<DateTime<Utc>>,
    /// Free-form key-value annotations.
    pub extra: BTreeMap<String, String>,
}

/// Kind of event a context log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorySignal {
    /// The story was created.
    Created,
    /// The story was started.
    Started,
    /// The story was focused.
    Focused,
}

/// Snapshot of context values (topic to value), e.g.
/// `location/home_work = "home"`.
pub type ContextState = BTreeMap<String, String>;

/// A persisted record of the context a story signal happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryContextLog {
    /// What happened.
    pub signal: StorySignal,
    /// Device on which it happened.
    pub device_id: String,
    /// When it happened.
    pub time: DateTime<Utc>,
    /// Context values at that time.
    pub context: ContextState,
}
