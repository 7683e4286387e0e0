//! Bookkeeping for surfaces handed to the story shell.
//!
//! A surface can be delivered only once the shell is attached and its anchor
//! surface has itself been accepted by the shell. Until then it waits in the
//! pending set. Delivering one surface can make others deliverable.

use std::collections::{BTreeMap, BTreeSet};

use storyrunner_core::module::{ModulePath, SurfaceHandle, SurfaceRelation};

use super::module_graph::ModuleGraph;

/// A surface waiting for its anchor or for the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingView {
    /// Module owning the surface.
    pub module_path: ModulePath,
    /// The surface.
    pub surface: SurfaceHandle,
    /// Requested relation to the anchor.
    pub relation: SurfaceRelation,
}

/// A surface ready to be handed to the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyView {
    /// Module owning the surface.
    pub module_path: ModulePath,
    /// Module whose surface it attaches to; `None` for the shell root.
    pub anchor: Option<ModulePath>,
    /// The surface.
    pub surface: SurfaceHandle,
    /// Requested relation to the anchor.
    pub relation: SurfaceRelation,
}

/// Pending and delivered surfaces of a story.
#[derive(Debug, Default)]
pub struct ShellTracker {
    attached: bool,
    connected: BTreeSet<ModulePath>,
    pending: BTreeMap<ModulePath, PendingView>,
}

impl ShellTracker {
    /// Creates a tracker with no shell attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the shell attached.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Queues a surface for delivery, replacing an earlier entry for the same
    /// module.
    pub fn add_pending(&mut self, view: PendingView) {
        self.pending.insert(view.module_path.clone(), view);
    }

    /// Removes and returns the surfaces that can be delivered now, in path
    /// order.
    ///
    /// A top-level module attaches at the shell root. Any other module needs
    /// a running in-shell anchor whose surface was delivered. A surface
    /// counts as delivered only once [`ShellTracker::mark_connected`] records
    /// it, so callers repeat until nothing more is ready.
    pub fn take_ready<C>(&mut self, graph: &ModuleGraph<C>) -> Vec<ReadyView> {
        if !self.attached {
            return Vec::new();
        }
        let ready: Vec<(ModulePath, Option<ModulePath>)> = self
            .pending
            .keys()
            .filter_map(|module_path| {
                if module_path.parent().is_root() {
                    return Some((module_path.clone(), None));
                }
                graph
                    .find_anchor(module_path)
                    .filter(|anchor| self.connected.contains(*anchor))
                    .map(|anchor| (module_path.clone(), Some(anchor.clone())))
            })
            .collect();
        ready
            .into_iter()
            .filter_map(|(module_path, anchor)| {
                let view = self.pending.remove(&module_path)?;
                Some(ReadyView {
                    module_path,
                    anchor,
                    surface: view.surface,
                    relation: view.relation,
                })
            })
            .collect()
    }

    /// Records that the shell accepted the module's surface.
    pub fn mark_connected(&mut self, module_path: ModulePath) {
        self.connected.insert(module_path);
    }

    /// Forgets a module's surface, delivered or pending.
    pub fn disconnect(&mut self, module_path: &ModulePath) {
        self.connected.remove(module_path);
        self.pending.remove(module_path);
    }

    /// Detaches the shell and drops every pending surface. Returns the
    /// surfaces that were never delivered.
    pub fn release_all(&mut self) -> Vec<PendingView> {
        self.attached = false;
        self.connected.clear();
        std::mem::take(&mut self.pending).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use storyrunner_core::module::{ModuleData, ModuleIntent, ModuleSource, ModuleSurface};

    use super::*;

    fn run(graph: &mut ModuleGraph<()>, segments: &[&str], surface: ModuleSurface) -> ModulePath {
        let path = ModulePath::from_segments(segments.iter().copied());
        graph.insert_starting(ModuleData {
            module_path: path.clone(),
            module_url: "mod://m".to_owned(),
            intent: ModuleIntent::default(),
            surface,
            module_source: ModuleSource::Internal,
            module_stopped: false,
        });
        graph.connect(&path, ());
        path
    }

    fn pending(path: &ModulePath) -> PendingView {
        PendingView {
            module_path: path.clone(),
            surface: SurfaceHandle::new(),
            relation: SurfaceRelation::default(),
        }
    }

    fn in_shell() -> ModuleSurface {
        ModuleSurface::InShell(SurfaceRelation::default())
    }

    fn order(views: &[ReadyView]) -> Vec<ModulePath> {
        views.iter().map(|view| view.module_path.clone()).collect()
    }

    #[test]
    fn test_nothing_is_ready_before_shell_attaches() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = run(&mut graph, &["a"], in_shell());
        let mut shell = ShellTracker::new();
        shell.add_pending(pending(&a));

        // Act
        let before = shell.take_ready(&graph);
        shell.attach();
        let after = shell.take_ready(&graph);

        // Assert
        assert!(before.is_empty());
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].anchor, None);
        assert!(!shell.connected.contains(&a));
    }

    #[test]
    fn test_child_waits_until_anchor_is_connected() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = run(&mut graph, &["a"], in_shell());
        let b = run(&mut graph, &["a", "b"], in_shell());
        let mut shell = ShellTracker::new();
        shell.attach();
        shell.add_pending(pending(&b));

        // Act
        let child_only = shell.take_ready(&graph);
        shell.add_pending(pending(&a));
        let anchor_wave = shell.take_ready(&graph);
        shell.mark_connected(a.clone());
        let child_wave = shell.take_ready(&graph);

        // Assert
        assert!(child_only.is_empty());
        assert_eq!(order(&anchor_wave), vec![a.clone()]);
        assert_eq!(order(&child_wave), vec![b]);
        assert_eq!(child_wave[0].anchor, Some(a));
        assert!(shell.pending.is_empty());
    }

    #[test]
    fn test_child_of_rejected_surface_stays_pending() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = run(&mut graph, &["a"], in_shell());
        let b = run(&mut graph, &["a", "b"], in_shell());
        let mut shell = ShellTracker::new();
        shell.attach();
        shell.add_pending(pending(&a));
        shell.add_pending(pending(&b));

        // Act
        let first = shell.take_ready(&graph);
        let second = shell.take_ready(&graph);

        // Assert
        assert_eq!(order(&first), vec![a.clone()]);
        assert!(second.is_empty());
        assert!(!shell.connected.contains(&a));
        assert!(shell.pending.contains_key(&b));
    }

    #[test]
    fn test_anchor_skips_embedded_parent() {
        // Arrange
        let mut graph = ModuleGraph::new();
        let a = run(&mut graph, &["a"], in_shell());
        run(&mut graph, &["a", "e"], ModuleSurface::Embedded);
        let leaf = run(&mut graph, &["a", "e", "leaf"], in_shell());
        let mut shell = ShellTracker::new();
        shell.attach();
        shell.add_pending(pending(&a));
        shell.add_pending(pending(&leaf));

        // Act
        shell.take_ready(&graph);
        shell.mark_connected(a.clone());
        let ready = shell.take_ready(&graph);

        // Assert
        assert_eq!(order(&ready), vec![leaf]);
        assert_eq!(ready[0].anchor, Some(a));
    }

    #[test]
    fn test_release_all_returns_undelivered_views() {
        let mut graph = ModuleGraph::new();
        let b = run(&mut graph, &["a", "b"], in_shell());
        let mut shell = ShellTracker::new();
        shell.attach();
        shell.add_pending(pending(&b));

        let released = shell.release_all();

        assert_eq!(released.len(), 1);
        assert!(!shell.attached);
        assert!(shell.pending.is_empty());
    }
}
