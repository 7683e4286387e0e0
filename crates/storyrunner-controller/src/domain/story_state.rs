//! Story state derived from the first module started in the story.

use storyrunner_core::module::{ModulePath, ModuleState};
use storyrunner_core::story::StoryState;

/// Tracks the aggregate story state.
///
/// The story follows the run state of the first module started in it, but
/// only while tracking is on. An explicit stop turns tracking off so the
/// root module's teardown does not leak intermediate states.
#[derive(Debug)]
pub struct StoryStateMachine {
    state: StoryState,
    track_root_module_state: bool,
    first_module_path: Option<ModulePath>,
}

impl StoryStateMachine {
    /// A story that was never started.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StoryState::Initial,
            track_root_module_state: true,
            first_module_path: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StoryState {
        self.state
    }

    /// Returns `true` while running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == StoryState::Running
    }

    /// Path of the first module started in the story, if any.
    #[must_use]
    pub fn first_module_path(&self) -> Option<&ModulePath> {
        self.first_module_path.as_ref()
    }

    /// Records a module start. The first one becomes the root module.
    pub fn note_module_started(&mut self, path: &ModulePath) {
        if self.first_module_path.is_none() {
            self.first_module_path = Some(path.clone());
        }
    }

    /// Applies a module state change. Returns the new story state if it
    /// changed.
    pub fn on_module_state_change(
        &mut self,
        path: &ModulePath,
        state: ModuleState,
    ) -> Option<StoryState> {
        if !self.track_root_module_state || self.first_module_path.as_ref() != Some(path) {
            return None;
        }
        let next = StoryState::from_root_module(state)?;
        self.transition(next)
    }

    /// Marks the story running after an explicit start.
    pub fn mark_running(&mut self) -> Option<StoryState> {
        self.transition(StoryState::Running)
    }

    /// Enters `Stopping` and stops following the root module.
    pub fn begin_stop(&mut self) -> Option<StoryState> {
        self.track_root_module_state = false;
        self.transition(StoryState::Stopping)
    }

    /// Enters `Stopped`. With `resume_tracking` the story follows its root
    /// module again on the next start.
    pub fn finish_stop(&mut self, resume_tracking: bool) -> Option<StoryState> {
        self.track_root_module_state = resume_tracking;
        if resume_tracking {
            self.first_module_path = None;
        }
        self.transition(StoryState::Stopped)
    }

    fn transition(&mut self, next: StoryState) -> Option<StoryState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

impl Default for StoryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ModulePath {
        ModulePath::from_segments(["root"])
    }

    #[test]
    fn test_first_module_drives_story_state() {
        // Arrange
        let mut story = StoryStateMachine::new();
        story.note_module_started(&root());
        story.note_module_started(&ModulePath::from_segments(["other"]));

        // Act
        let from_other =
            story.on_module_state_change(&ModulePath::from_segments(["other"]), ModuleState::Error);
        let from_root = story.on_module_state_change(&root(), ModuleState::Running);

        // Assert
        assert_eq!(from_other, None);
        assert_eq!(from_root, Some(StoryState::Running));
        assert_eq!(story.first_module_path(), Some(&root()));
    }

    #[test]
    fn test_stop_suspends_root_tracking() {
        // Arrange
        let mut story = StoryStateMachine::new();
        story.note_module_started(&root());
        story.on_module_state_change(&root(), ModuleState::Running);

        // Act
        let stopping = story.begin_stop();
        let ignored = story.on_module_state_change(&root(), ModuleState::Stopped);
        let stopped = story.finish_stop(true);

        // Assert
        assert_eq!(stopping, Some(StoryState::Stopping));
        assert_eq!(ignored, None);
        assert_eq!(stopped, Some(StoryState::Stopped));
        assert_eq!(story.first_module_path(), None);
    }

    #[test]
    fn test_repeated_state_is_not_reported() {
        let mut story = StoryStateMachine::new();

        assert_eq!(story.mark_running(), Some(StoryState::Running));
        assert_eq!(story.mark_running(), None);
        assert!(story.is_running());
    }
}
