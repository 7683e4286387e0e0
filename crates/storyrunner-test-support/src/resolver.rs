//! Static manifest resolver.

use std::collections::HashMap;

use async_trait::async_trait;
use storyrunner_controller::ModuleResolver;
use storyrunner_core::error::StoryError;
use storyrunner_core::module::{EmbeddedChild, ModuleIntent, ModuleManifest};

/// Resolves URLs directly and verbs through a fixed table. Manifests may be
/// given eager children.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    verbs: HashMap<String, String>,
    children: HashMap<String, Vec<EmbeddedChild>>,
}

impl StaticResolver {
    /// A resolver with no verbs and no children.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `verb` to `url`.
    #[must_use]
    pub fn with_verb(mut self, verb: &str, url: &str) -> Self {
        self.verbs.insert(verb.to_owned(), url.to_owned());
        self
    }

    /// Gives the manifest of `url` eager children.
    #[must_use]
    pub fn with_children(mut self, url: &str, children: Vec<EmbeddedChild>) -> Self {
        self.children.insert(url.to_owned(), children);
        self
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, intent: &ModuleIntent) -> Result<ModuleManifest, StoryError> {
        let url = match (&intent.url, &intent.verb) {
            (Some(url), _) => url.clone(),
            (None, Some(verb)) => self
                .verbs
                .get(verb)
                .cloned()
                .ok_or_else(|| {
                    StoryError::ManifestResolutionFailure(format!("no module handles {verb}"))
                })?,
            (None, None) => {
                return Err(StoryError::ManifestResolutionFailure(
                    "intent names neither url nor verb".to_owned(),
                ));
            }
        };
        Ok(ModuleManifest {
            children: self.children.get(&url).cloned().unwrap_or_default(),
            verb: intent.verb.clone(),
            url,
        })
    }
}
