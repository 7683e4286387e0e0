//! Shared application state.

use storyrunner_controller::StoryController;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Controller of the hosted story.
    pub controller: StoryController,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(controller: StoryController) -> Self {
        Self { controller }
    }
}
