//! Ports to the collaborators the controller drives: module launcher,
//! manifest resolver, story shell and importance policy.

use std::sync::Arc;

use async_trait::async_trait;

use storyrunner_core::error::StoryError;
use storyrunner_core::module::{
    ModuleIntent, ModuleManifest, ModulePath, SurfaceHandle, SurfaceRelation,
};
use storyrunner_core::story::{ContextState, StoryContextLog, StorySignal};

use super::context::{ModuleContext, ShellContext};
use crate::domain::container::ContainerView;

/// A launched module as seen by the controller.
#[async_trait]
pub trait ModuleInstance: Send + Sync {
    /// Asks the module to shut down and resolves once it acknowledged.
    async fn stop(&self);

    /// Terminates the module without waiting for it.
    fn kill(&self);
}

/// Result of a successful launch.
pub struct LaunchedModule {
    /// Handle used to stop the module.
    pub instance: Box<dyn ModuleInstance>,
    /// The module's surface, if it produced one.
    pub surface: Option<SurfaceHandle>,
}

impl std::fmt::Debug for LaunchedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedModule")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

/// Starts module binaries.
#[async_trait]
pub trait ModuleLauncher: Send + Sync {
    /// Launches the module described by `manifest` and completes once its
    /// handshake did. A single attempt is made.
    ///
    /// # Errors
    ///
    /// Any error is reported to the caller of the start as
    /// [`StoryError::LaunchFailure`].
    async fn launch(
        &self,
        manifest: &ModuleManifest,
        context: ModuleContext,
    ) -> Result<LaunchedModule, StoryError>;
}

/// Turns an intent into a manifest.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Resolves `intent`.
    ///
    /// # Errors
    ///
    /// Returns [`StoryError::ManifestResolutionFailure`] if nothing handles
    /// the intent.
    async fn resolve(&self, intent: &ModuleIntent) -> Result<ModuleManifest, StoryError>;
}

/// Resolver that accepts intents carrying a concrete URL and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlResolver;

#[async_trait]
impl ModuleResolver for UrlResolver {
    async fn resolve(&self, intent: &ModuleIntent) -> Result<ModuleManifest, StoryError> {
        match &intent.url {
            Some(url) => Ok(ModuleManifest {
                url: url.clone(),
                verb: intent.verb.clone(),
                children: Vec::new(),
            }),
            None => Err(StoryError::ManifestResolutionFailure(format!(
                "no module url for verb {}",
                intent.verb.as_deref().unwrap_or("<none>")
            ))),
        }
    }
}

/// The process laying out a story's surfaces.
#[async_trait]
pub trait StoryShell: Send + Sync {
    /// Displays `surface` of `owner`, attached to the surface of `anchor`, or
    /// at the shell root when `anchor` is `None`.
    async fn attach_surface(
        &self,
        owner: &ModulePath,
        anchor: Option<&ModulePath>,
        surface: SurfaceHandle,
        relation: &SurfaceRelation,
    ) -> Result<(), StoryError>;

    /// Focuses the surface of `owner`.
    async fn focus_surface(&self, owner: &ModulePath) -> Result<(), StoryError>;

    /// Removes focus from the surface of `owner`.
    async fn defocus_surface(&self, owner: &ModulePath) -> Result<(), StoryError>;

    /// Displays a container with the surfaces of its nodes.
    async fn add_container(&self, container: ContainerView) -> Result<(), StoryError>;

    /// Shuts the shell down.
    async fn terminate(&self);
}

/// Launches story shells.
#[async_trait]
pub trait StoryShellHost: Send + Sync {
    /// Launches a shell for one story. The context lets the shell ask for
    /// focus changes.
    async fn launch_shell(&self, context: ShellContext) -> Result<Arc<dyn StoryShell>, StoryError>;
}

/// Scores how relevant a story is in a given context.
pub trait ImportancePolicy: Send + Sync {
    /// Returns a score in `0.0..=1.0`.
    fn importance(&self, context: &ContextState, log: &[StoryContextLog]) -> f32;
}

/// Scores a story by how often it was created in the current value of each
/// configured context topic.
///
/// For every topic present in `context`, the score is the fraction of
/// `Created` log entries carrying that topic whose value matches. The result
/// is the mean over those topics, and `1.0` if the context carries none.
#[derive(Debug, Clone)]
pub struct TopicMatchImportance {
    topics: Vec<String>,
}

impl TopicMatchImportance {
    /// Creates a policy over `topics`.
    #[must_use]
    pub fn new(topics: Vec<String>) -> Self {
        Self { topics }
    }
}

impl ImportancePolicy for TopicMatchImportance {
    #[allow(clippy::cast_precision_loss)]
    fn importance(&self, context: &ContextState, log: &[StoryContextLog]) -> f32 {
        let mut scores = Vec::new();
        for topic in &self.topics {
            let Some(current) = context.get(topic) else {
                continue;
            };
            let mut count = 0_usize;
            let mut matches = 0_usize;
            for entry in log.iter().filter(|entry| entry.signal == StorySignal::Created) {
                if let Some(value) = entry.context.get(topic) {
                    count += 1;
                    if value == current {
                        matches += 1;
                    }
                }
            }
            scores.push(if count == 0 {
                0.0
            } else {
                matches as f32 / count as f32
            });
        }
        if scores.is_empty() {
            1.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    const TOPIC: &str = "location/home_work";

    fn entry(signal: StorySignal, value: Option<&str>) -> StoryContextLog {
        let mut context = ContextState::new();
        if let Some(value) = value {
            context.insert(TOPIC.to_owned(), value.to_owned());
        }
        StoryContextLog {
            signal,
            device_id: "device".to_owned(),
            time: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            context,
        }
    }

    fn context(value: &str) -> ContextState {
        ContextState::from([(TOPIC.to_owned(), value.to_owned())])
    }

    #[test]
    fn test_importance_is_fraction_of_matching_created_entries() {
        // Arrange
        let policy = TopicMatchImportance::new(vec![TOPIC.to_owned()]);
        let log = vec![
            entry(StorySignal::Created, Some("home")),
            entry(StorySignal::Created, Some("work")),
            entry(StorySignal::Created, Some("home")),
            entry(StorySignal::Created, None),
            entry(StorySignal::Focused, Some("work")),
        ];

        // Act
        let score = policy.importance(&context("home"), &log);

        // Assert
        assert!((score - 2.0 / 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_importance_without_topic_in_context_is_one() {
        let policy = TopicMatchImportance::new(vec![TOPIC.to_owned()]);

        let score = policy.importance(&ContextState::new(), &[]);

        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_importance_with_no_created_entries_is_zero() {
        let policy = TopicMatchImportance::new(vec![TOPIC.to_owned()]);

        let log = [entry(StorySignal::Started, Some("home"))];
        let score = policy.importance(&context("home"), &log);

        assert!(score.abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_url_resolver_requires_url() {
        let resolver = UrlResolver;

        let resolved = resolver.resolve(&ModuleIntent::for_url("mod://a")).await;
        let unresolved = resolver.resolve(&ModuleIntent::for_verb("view")).await;

        assert_eq!(resolved.unwrap().url, "mod://a");
        match unresolved {
            Err(StoryError::ManifestResolutionFailure(reason)) => assert!(reason.contains("view")),
            other => panic!("expected ManifestResolutionFailure, got {other:?}"),
        }
    }
}
