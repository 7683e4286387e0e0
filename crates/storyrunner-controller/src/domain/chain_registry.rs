//! Per-module chains mapping intent slot names to link paths.

use std::collections::BTreeMap;

use storyrunner_core::link::LinkPath;
use storyrunner_core::module::{ModuleIntent, ModulePath, Noun};

/// Slot-to-link mapping of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// The module the chain belongs to.
    pub module_path: ModulePath,
    slots: BTreeMap<String, LinkPath>,
}

/// A link that a freshly created chain needs, with the value to seed it with
/// when it does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSeed {
    /// Link the slot maps to.
    pub link_path: LinkPath,
    /// Initial value for links owned by the chain's module.
    pub initial: Option<serde_json::Value>,
}

impl Chain {
    /// Builds a chain from a module intent. Slots naming an existing link map
    /// to it; slots carrying JSON map to a link owned by the module and named
    /// after the slot.
    #[must_use]
    pub fn from_intent(module_path: &ModulePath, intent: &ModuleIntent) -> (Self, Vec<ChainSeed>) {
        let mut slots = BTreeMap::new();
        let mut seeds = Vec::new();
        for (key, noun) in &intent.nouns {
            let seed = match noun {
                Noun::Link(path) => ChainSeed {
                    link_path: path.clone(),
                    initial: None,
                },
                Noun::Json(value) => ChainSeed {
                    link_path: LinkPath::new(module_path.clone(), key.clone()),
                    initial: Some(value.clone()),
                },
            };
            slots.insert(key.clone(), seed.link_path.clone());
            seeds.push(seed);
        }
        (
            Self {
                module_path: module_path.clone(),
                slots,
            },
            seeds,
        )
    }

    /// Link the slot `key` maps to.
    #[must_use]
    pub fn slot(&self, key: &str) -> Option<&LinkPath> {
        self.slots.get(key)
    }

    /// Iterates over `(slot, link)` pairs.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &LinkPath)> {
        self.slots.iter().map(|(key, path)| (key.as_str(), path))
    }
}

/// Chains of all modules in a story.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<ModulePath, Chain>,
}

impl ChainRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain of `module_path`, building it from `intent` the
    /// first time. The seeds are returned only when the chain was created;
    /// an existing chain is never rebuilt.
    pub fn get_or_create(
        &mut self,
        module_path: &ModulePath,
        intent: &ModuleIntent,
    ) -> (&Chain, Vec<ChainSeed>) {
        if self.chains.contains_key(module_path) {
            let chain = &self.chains[module_path];
            return (chain, Vec::new());
        }
        let (chain, seeds) = Chain::from_intent(module_path, intent);
        let chain = self.chains.entry(module_path.clone()).or_insert(chain);
        (chain, seeds)
    }

    /// Chain of `module_path`, if any.
    #[must_use]
    pub fn get(&self, module_path: &ModulePath) -> Option<&Chain> {
        self.chains.get(module_path)
    }

    /// Link slot `key` of the module's chain maps to, if both exist.
    #[must_use]
    pub fn resolve(&self, module_path: &ModulePath, key: &str) -> Option<&LinkPath> {
        self.chains.get(module_path)?.slot(key)
    }

    /// Link a module addresses by `key`: the chain slot if one exists,
    /// otherwise a link owned by the module and named `key`.
    #[must_use]
    pub fn link_path_for_key(&self, module_path: &ModulePath, key: &str) -> LinkPath {
        self.resolve(module_path, key)
            .cloned()
            .unwrap_or_else(|| LinkPath::new(module_path.clone(), key))
    }

    /// Returns `true` if any chain slot maps to `link_path`.
    #[must_use]
    pub fn references(&self, link_path: &LinkPath) -> bool {
        self.chains
            .values()
            .any(|chain| chain.slots.values().any(|slot| slot == link_path))
    }

    /// Removes the chain of `module_path`.
    pub fn remove(&mut self, module_path: &ModulePath) -> Option<Chain> {
        self.chains.remove(module_path)
    }

    /// Removes every chain.
    pub fn clear(&mut self) {
        self.chains.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn module() -> ModulePath {
        ModulePath::from_segments(["a"])
    }

    #[test]
    fn test_from_intent_maps_json_slots_to_module_owned_links() {
        // Arrange
        let shared = LinkPath::story("shared");
        let intent = ModuleIntent::for_url("mod://a")
            .with_noun("entity", Noun::Json(json!({"name": "x"})))
            .with_noun("shared", Noun::Link(shared.clone()));

        // Act
        let (chain, seeds) = Chain::from_intent(&module(), &intent);

        // Assert
        assert_eq!(chain.slot("entity"), Some(&LinkPath::new(module(), "entity")));
        assert_eq!(chain.slot("shared"), Some(&shared));
        assert_eq!(seeds.len(), 2);
        let entity = seeds
            .iter()
            .find(|seed| seed.link_path.link_name == "entity")
            .unwrap();
        assert_eq!(entity.initial, Some(json!({"name": "x"})));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        // Arrange
        let mut chains = ChainRegistry::new();
        let first_intent = ModuleIntent::default().with_noun("k", Noun::Json(json!(1)));
        let second_intent = ModuleIntent::default().with_noun("other", Noun::Json(json!(2)));

        // Act
        let (_, first_seeds) = chains.get_or_create(&module(), &first_intent);
        let first_seeds = first_seeds.len();
        let (chain, second_seeds) = chains.get_or_create(&module(), &second_intent);

        // Assert
        assert_eq!(first_seeds, 1);
        assert!(second_seeds.is_empty());
        assert!(chain.slot("k").is_some());
        assert!(chain.slot("other").is_none());
    }

    #[test]
    fn test_link_path_for_key_falls_back_to_module_link() {
        let mut chains = ChainRegistry::new();
        let shared = LinkPath::story("shared");
        let intent = ModuleIntent::default().with_noun("in", Noun::Link(shared.clone()));
        chains.get_or_create(&module(), &intent);

        assert_eq!(chains.link_path_for_key(&module(), "in"), shared);
        assert_eq!(
            chains.link_path_for_key(&module(), "missing"),
            LinkPath::new(module(), "missing")
        );
    }

    #[test]
    fn test_references_tracks_slot_updates() {
        // Arrange
        let mut chains = ChainRegistry::new();
        let old = LinkPath::story("old");
        let new = LinkPath::story("new");
        let intent = ModuleIntent::default().with_noun("in", Noun::Link(old.clone()));
        chains.get_or_create(&module(), &intent);

        // Act
        if let Some(chain) = chains.chains.get_mut(&module()) {
            chain.slots.insert("in".to_owned(), new.clone());
        }

        // Assert
        assert!(!chains.references(&old));
        assert!(chains.references(&new));
    }
}
