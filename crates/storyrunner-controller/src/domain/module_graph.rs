//! Arena of module records indexed by path.
//!
//! Children are found by prefix scan over the ordered path index; there is no
//! pointer linkage between records. The connection type is generic so the
//! graph holds whatever live handles the application layer pairs with a
//! running module.

use std::collections::BTreeMap;

use storyrunner_core::module::{ModuleData, ModulePath, ModuleState};

/// One module known to the running story.
#[derive(Debug)]
pub struct ModuleRecord<C> {
    /// Persistent description of the module.
    pub data: ModuleData,
    /// Current run state.
    pub state: ModuleState,
    /// Live handles, present exactly while the module is running.
    pub connection: Option<C>,
}

/// All module records of a story.
#[derive(Debug)]
pub struct ModuleGraph<C> {
    records: BTreeMap<ModulePath, ModuleRecord<C>>,
    /// Final state of modules whose record was removed and not restarted.
    ended: BTreeMap<ModulePath, ModuleState>,
}

impl<C> ModuleGraph<C> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            ended: BTreeMap::new(),
        }
    }

    /// Allocates a record in `Starting` for `data.module_path`.
    ///
    /// A previous record at the same path that is not live (failed launch) is
    /// replaced.
    ///
    /// # Panics
    ///
    /// Panics if a live or starting module already occupies the path. Callers
    /// reject duplicate names before reaching this point.
    pub fn insert_starting(&mut self, data: ModuleData) {
        let path = data.module_path.clone();
        if let Some(existing) = self.records.get(&path) {
            assert!(
                existing.connection.is_none() && existing.state != ModuleState::Starting,
                "module {path} started twice"
            );
        }
        self.ended.remove(&path);
        self.records.insert(
            path,
            ModuleRecord {
                data,
                state: ModuleState::Starting,
                connection: None,
            },
        );
    }

    /// Pairs a starting module with its live connection and marks it
    /// `Running`.
    ///
    /// # Panics
    ///
    /// Panics if no starting record exists at `path`.
    pub fn connect(&mut self, path: &ModulePath, connection: C) {
        let record = self
            .records
            .get_mut(path)
            .unwrap_or_else(|| panic!("module {path} connected without a record"));
        assert_eq!(
            record.state,
            ModuleState::Starting,
            "module {path} connected outside of Starting"
        );
        record.connection = Some(connection);
        record.state = ModuleState::Running;
    }

    /// Applies a run state. Returns `true` if the state changed.
    pub fn set_state(&mut self, path: &ModulePath, state: ModuleState) -> bool {
        match self.records.get_mut(path) {
            Some(record) if record.state != state => {
                record.state = state;
                true
            }
            _ => false,
        }
    }

    /// Returns the record at `path`, live or not.
    #[must_use]
    pub fn get(&self, path: &ModulePath) -> Option<&ModuleRecord<C>> {
        self.records.get(path)
    }

    /// Mutable access to the record at `path`.
    pub fn get_mut(&mut self, path: &ModulePath) -> Option<&mut ModuleRecord<C>> {
        self.records.get_mut(path)
    }

    /// Returns the record at `path` only if it has a live connection.
    #[must_use]
    pub fn find_connection(&self, path: &ModulePath) -> Option<&ModuleRecord<C>> {
        self.records
            .get(path)
            .filter(|record| record.connection.is_some())
    }

    /// Returns `true` if a live connection exists at `path`.
    #[must_use]
    pub fn is_running(&self, path: &ModulePath) -> bool {
        self.find_connection(path).is_some()
    }

    /// Returns `true` if a start for `path` is in flight or the module runs.
    #[must_use]
    pub fn is_occupied(&self, path: &ModulePath) -> bool {
        self.records.get(path).is_some_and(|record| {
            record.connection.is_some() || record.state == ModuleState::Starting
        })
    }

    /// Returns `true` if the module at `path` was stopped and not restarted.
    #[must_use]
    pub fn is_retired(&self, path: &ModulePath) -> bool {
        self.final_state(path) == Some(ModuleState::Stopped)
    }

    /// State a removed module ended in: `Stopped` after a stop, `Error` after
    /// a failed launch. `None` while a record exists or for unknown paths.
    #[must_use]
    pub fn final_state(&self, path: &ModulePath) -> Option<ModuleState> {
        self.ended.get(path).copied()
    }

    /// Finds the shell anchor of the module at `path`: the closest running
    /// ancestor whose surface is in the shell. Embedded ancestors are passed
    /// through. Returns `None` if any ancestor on the way is not running, or
    /// if the walk reaches the story root.
    #[must_use]
    pub fn find_anchor(&self, path: &ModulePath) -> Option<&ModulePath> {
        let mut current = path.parent();
        loop {
            if current.is_root() {
                return None;
            }
            let record = self.find_connection(&current)?;
            if record.data.surface.is_in_shell() {
                return Some(&record.data.module_path);
            }
            current = current.parent();
        }
    }

    /// Running strict descendants of `path`, deepest first, so that stopping
    /// them in order never stops a parent before its children.
    #[must_use]
    pub fn running_descendants(&self, path: &ModulePath) -> Vec<ModulePath> {
        let mut descendants: Vec<ModulePath> = self
            .records
            .range(path.clone()..)
            .skip_while(|(candidate, _)| *candidate == path)
            .take_while(|(candidate, _)| path.is_ancestor_of(candidate))
            .filter(|(_, record)| record.connection.is_some())
            .map(|(candidate, _)| candidate.clone())
            .collect();
        sort_deepest_first(&mut descendants);
        descendants
    }

    /// All running module paths, deepest first.
    #[must_use]
    pub fn running_paths_deepest_first(&self) -> Vec<ModulePath> {
        let mut paths: Vec<ModulePath> = self
            .records
            .iter()
            .filter(|(_, record)| record.connection.is_some())
            .map(|(path, _)| path.clone())
            .collect();
        sort_deepest_first(&mut paths);
        paths
    }

    /// Iterates over running module records in path order.
    pub fn running(&self) -> impl Iterator<Item = &ModuleRecord<C>> {
        self.records
            .values()
            .filter(|record| record.connection.is_some())
    }

    /// Detaches the live connection of the module at `path`.
    pub fn take_connection(&mut self, path: &ModulePath) -> Option<C> {
        self.records.get_mut(path)?.connection.take()
    }

    /// Removes the record at `path` after its stop completed.
    pub fn retire(&mut self, path: &ModulePath) -> Option<ModuleRecord<C>> {
        let record = self.records.remove(path)?;
        self.ended.insert(path.clone(), ModuleState::Stopped);
        Some(record)
    }

    /// Removes the record of a module whose launch failed.
    pub fn discard_failed(&mut self, path: &ModulePath) -> Option<ModuleRecord<C>> {
        let record = self.records.remove(path)?;
        self.ended.insert(path.clone(), ModuleState::Error);
        Some(record)
    }

    /// Removes every record, returning them for teardown.
    pub fn drain(&mut self) -> Vec<ModuleRecord<C>> {
        let records = std::mem::take(&mut self.records);
        self.ended.extend(records.keys().map(|path| (path.clone(), ModuleState::Stopped)));
        records.into_values().collect()
    }

    /// Number of records, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<C> Default for ModuleGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_deepest_first(paths: &mut [ModulePath]) {
    paths.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));
}

#[cfg(test)]
mod tests {
    use storyrunner_core::module::{ModuleIntent, ModuleSource, ModuleSurface, SurfaceRelation};

    use super::*;

    fn data(path: &[&str], surface: ModuleSurface) -> ModuleData {
        ModuleData {
            module_path: ModulePath::from_segments(path.iter().copied()),
            module_url: format!("mod://{}", path.join("/")),
            intent: ModuleIntent::default(),
            surface,
            module_source: ModuleSource::Internal,
            module_stopped: false,
        }
    }

    fn in_shell() -> ModuleSurface {
        ModuleSurface::InShell(SurfaceRelation::default())
    }

    fn start(graph: &mut ModuleGraph<()>, path: &[&str], surface: ModuleSurface) -> ModulePath {
        let data = data(path, surface);
        let module_path = data.module_path.clone();
        graph.insert_starting(data);
        graph.connect(&module_path, ());
        module_path
    }

    #[test]
    fn test_connect_marks_module_running() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let path = ModulePath::from_segments(["a"]);
        graph.insert_starting(data(&["a"], in_shell()));

        // Act
        let starting = graph.get(&path).unwrap().state;
        graph.connect(&path, ());

        // Assert
        assert_eq!(starting, ModuleState::Starting);
        assert_eq!(graph.get(&path).unwrap().state, ModuleState::Running);
        assert!(graph.is_running(&path));
    }

    #[test]
    #[should_panic(expected = "started twice")]
    fn test_double_start_of_running_path_panics() {
        let mut graph = ModuleGraph::new();
        start(&mut graph, &["a"], in_shell());

        graph.insert_starting(data(&["a"], in_shell()));
    }

    #[test]
    fn test_failed_start_can_be_replaced() {
        // Arrange
        let mut graph: ModuleGraph<()> = ModuleGraph::new();
        let path = ModulePath::from_segments(["a"]);
        graph.insert_starting(data(&["a"], in_shell()));
        graph.set_state(&path, ModuleState::Error);

        // Act
        graph.insert_starting(data(&["a"], in_shell()));

        // Assert
        assert_eq!(graph.get(&path).unwrap().state, ModuleState::Starting);
    }

    #[test]
    fn test_discard_failed_removes_record_and_remembers_error() {
        // Arrange
        let mut graph: ModuleGraph<()> = ModuleGraph::new();
        let path = ModulePath::from_segments(["a"]);
        graph.insert_starting(data(&["a"], in_shell()));
        graph.set_state(&path, ModuleState::Error);

        // Act
        let record = graph.discard_failed(&path);

        // Assert
        assert!(record.is_some());
        assert!(graph.is_empty());
        assert!(!graph.is_retired(&path));
        assert_eq!(graph.final_state(&path), Some(ModuleState::Error));
        graph.insert_starting(data(&["a"], in_shell()));
        assert_eq!(graph.final_state(&path), None);
    }

    #[test]
    fn test_find_anchor_skips_embedded_ancestors() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = start(&mut graph, &["a"], in_shell());
        start(&mut graph, &["a", "e"], ModuleSurface::Embedded);
        let leaf = start(&mut graph, &["a", "e", "leaf"], in_shell());

        // Act
        let anchor = graph.find_anchor(&leaf);

        // Assert
        assert_eq!(anchor, Some(&a));
    }

    #[test]
    fn test_find_anchor_returns_none_when_intermediate_not_running() {
        // Arrange
        let mut graph = ModuleGraph::new();
        start(&mut graph, &["a"], in_shell());
        let e = ModulePath::from_segments(["a", "e"]);
        graph.insert_starting(data(&["a", "e"], ModuleSurface::Embedded));
        let leaf = ModulePath::from_segments(["a", "e", "leaf"]);

        // Act
        let anchor = graph.find_anchor(&leaf);

        // Assert
        assert!(!graph.is_running(&e));
        assert_eq!(anchor, None);
    }

    #[test]
    fn test_find_anchor_of_top_level_module_is_none() {
        let mut graph = ModuleGraph::new();
        let a = start(&mut graph, &["a"], in_shell());

        assert_eq!(graph.find_anchor(&a), None);
    }

    #[test]
    fn test_running_descendants_are_deepest_first_and_exclude_siblings() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = start(&mut graph, &["a"], in_shell());
        start(&mut graph, &["a", "b"], in_shell());
        start(&mut graph, &["a", "b", "c"], in_shell());
        start(&mut graph, &["a", "d"], in_shell());
        start(&mut graph, &["ab"], in_shell());

        // Act
        let descendants = graph.running_descendants(&a);

        // Assert
        assert_eq!(
            descendants,
            vec![
                ModulePath::from_segments(["a", "b", "c"]),
                ModulePath::from_segments(["a", "b"]),
                ModulePath::from_segments(["a", "d"]),
            ]
        );
    }

    #[test]
    fn test_retire_removes_record_and_remembers_path() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = start(&mut graph, &["a"], in_shell());

        // Act
        let connection = graph.take_connection(&a);
        let record = graph.retire(&a);

        // Assert
        assert!(connection.is_some());
        assert!(record.is_some());
        assert!(graph.get(&a).is_none());
        assert!(graph.is_retired(&a));
    }
}
