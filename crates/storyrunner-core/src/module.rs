//! Module identity and module records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::link::LinkPath;

/// Hierarchical path of a module within a story, root-most segment first.
///
/// The empty path denotes the story itself and is the parent of every
/// top-level module.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The empty path, parent of all top-level modules.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from its segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` for the empty path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment of the path, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns the parent path. The parent of the empty path is the empty
    /// path.
    #[must_use]
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    /// Returns this path extended by `name`.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Returns `true` if `self` is a strict prefix of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Encodes the path for use in ledger keys: segments are escaped and
    /// joined with `:`.
    #[must_use]
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Escapes the key separators `\`, `:` and `/` with a backslash.
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '\\' | ':' | '/') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Run state of a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Launch requested, handshake not yet complete.
    Starting,
    /// Handshake complete; the module has a live connection.
    Running,
    /// Stop requested, acknowledgement pending.
    Stopping,
    /// Stopped, connection released.
    Stopped,
    /// Failed to launch, or crashed while running.
    Error,
}

/// Who asked for a module to be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSource {
    /// Started by another module of the same story.
    Internal,
    /// Started from outside the story (story provider, another device).
    External,
}

/// How a module's surface is arranged relative to its anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceArrangement {
    /// No preference.
    #[default]
    None,
    /// Shown side by side with the anchor.
    Copresent,
    /// Shown after the anchor.
    Sequential,
}

/// Lifetime coupling of a surface to its anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceDependency {
    /// Independent of the anchor.
    #[default]
    None,
    /// Dismissed together with the anchor.
    Dependent,
}

/// Relation of a module surface to its anchor in the story shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRelation {
    /// Spatial arrangement.
    pub arrangement: SurfaceArrangement,
    /// Lifetime coupling.
    pub dependency: SurfaceDependency,
    /// Relative emphasis, `1.0` being equal weight.
    pub emphasis: f32,
}

impl Default for SurfaceRelation {
    fn default() -> Self {
        Self {
            arrangement: SurfaceArrangement::None,
            dependency: SurfaceDependency::None,
            emphasis: 1.0,
        }
    }
}

/// Where a module's surface goes once the module runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSurface {
    /// Handed to the story shell, anchored at the closest non-embedded
    /// running ancestor.
    InShell(SurfaceRelation),
    /// Returned to the embedding parent; never seen by the shell.
    Embedded,
    /// No surface.
    Headless,
}

impl ModuleSurface {
    /// Returns `true` for surfaces displayed by the story shell.
    #[must_use]
    pub fn is_in_shell(&self) -> bool {
        matches!(self, Self::InShell(_))
    }
}

/// One named input of a module intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Noun {
    /// Initial JSON for a link created for this slot.
    Json(serde_json::Value),
    /// An existing link shared with the module.
    Link(LinkPath),
}

/// What to run: either a concrete module URL or a verb to resolve, plus the
/// data slots ("daisy") handed to the module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleIntent {
    /// Concrete module URL, if known.
    pub url: Option<String>,
    /// Verb to resolve when no URL is given.
    pub verb: Option<String>,
    /// Named data slots.
    pub nouns: BTreeMap<String, Noun>,
}

impl ModuleIntent {
    /// An intent for a known module URL with no data slots.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// An intent to be resolved by verb.
    #[must_use]
    pub fn for_verb(verb: impl Into<String>) -> Self {
        Self {
            verb: Some(verb.into()),
            ..Self::default()
        }
    }

    /// Adds a data slot.
    #[must_use]
    pub fn with_noun(mut self, name: impl Into<String>, noun: Noun) -> Self {
        self.nouns.insert(name.into(), noun);
        self
    }
}

/// A child module that a manifest asks to be started together with its
/// parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChild {
    /// Name of the child below the parent path.
    pub name: String,
    /// What to run for the child.
    pub intent: ModuleIntent,
    /// Where the child's surface goes.
    pub surface: ModuleSurface,
}

/// Resolved description of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Binary URL to launch.
    pub url: String,
    /// Verb this module handles, if any.
    pub verb: Option<String>,
    /// Children started eagerly once this module runs.
    pub children: Vec<EmbeddedChild>,
}

impl ModuleManifest {
    /// A manifest with no verb and no eager children.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verb: None,
            children: Vec::new(),
        }
    }
}

/// Persisted record of a module in a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    /// Identity of the module.
    pub module_path: ModulePath,
    /// Resolved module URL.
    pub module_url: String,
    /// The intent the module was started with.
    pub intent: ModuleIntent,
    /// Surface placement.
    pub surface: ModuleSurface,
    /// Origin of the start request.
    pub module_source: ModuleSource,
    /// Set once the module was explicitly stopped.
    pub module_stopped: bool,
}

/// Opaque handle to a module's visual surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceHandle(pub Uuid);

impl SurfaceHandle {
    /// Allocates a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceHandle {
    fn default() -> Self {
        Self::new()
    }
}
