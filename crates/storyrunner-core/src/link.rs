//! Link identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::module::{ModulePath, escape_segment};

/// Address of a link: the owning module path plus a link name.
///
/// Links shared across a chain are addressed the same way; the chain only
/// maps a slot name to one of these paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkPath {
    /// The module the link belongs to. Empty for story-level links.
    pub module_path: ModulePath,
    /// Name of the link within its module.
    pub link_name: String,
}

impl LinkPath {
    /// Creates a link path.
    pub fn new(module_path: ModulePath, link_name: impl Into<String>) -> Self {
        Self {
            module_path,
            link_name: link_name.into(),
        }
    }

    /// A story-level link not owned by any module.
    pub fn story(link_name: impl Into<String>) -> Self {
        Self::new(ModulePath::root(), link_name)
    }

    /// Encodes the link path for use in ledger keys.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}/{}",
            self.module_path.encode(),
            escape_segment(&self.link_name)
        )
    }
}

impl fmt::Display for LinkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module_path, self.link_name)
    }
}

/// Access a link connection grants its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkConnectionType {
    /// May read, watch and write.
    ReadWrite,
    /// May read and watch only.
    ReadOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_separates_module_path_and_name() {
        let path = LinkPath::new(ModulePath::from_segments(["a", "b"]), "in/out");

        assert_eq!(path.encode(), "a:b/in\\/out");
    }

    #[test]
    fn test_story_link_has_empty_module_path() {
        let path = LinkPath::story("shared");

        assert!(path.module_path.is_root());
        assert_eq!(path.encode(), "/shared");
    }
}
