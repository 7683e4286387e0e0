//! Story shell that only traces what it is asked to display.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use storyrunner_controller::domain::container::ContainerView;
use storyrunner_controller::{ShellContext, StoryShell, StoryShellHost};
use storyrunner_core::error::StoryError;
use storyrunner_core::module::{ModulePath, SurfaceHandle, SurfaceRelation};

/// A headless shell. Surfaces are accepted and logged; nothing is drawn.
#[derive(Debug)]
pub struct LoggingShell {
    story_id: String,
}

#[async_trait]
impl StoryShell for LoggingShell {
    async fn attach_surface(
        &self,
        owner: &ModulePath,
        anchor: Option<&ModulePath>,
        surface: SurfaceHandle,
        relation: &SurfaceRelation,
    ) -> Result<(), StoryError> {
        info!(
            story_id = %self.story_id,
            module = %owner,
            anchor = ?anchor.map(ToString::to_string),
            surface = %surface.0,
            arrangement = ?relation.arrangement,
            "surface attached"
        );
        Ok(())
    }

    async fn focus_surface(&self, owner: &ModulePath) -> Result<(), StoryError> {
        info!(story_id = %self.story_id, module = %owner, "surface focused");
        Ok(())
    }

    async fn defocus_surface(&self, owner: &ModulePath) -> Result<(), StoryError> {
        info!(story_id = %self.story_id, module = %owner, "surface defocused");
        Ok(())
    }

    async fn add_container(&self, container: ContainerView) -> Result<(), StoryError> {
        info!(
            story_id = %self.story_id,
            container = %container.container_name,
            parent = %container.parent,
            views = container.views.len(),
            "container added"
        );
        Ok(())
    }

    async fn terminate(&self) {
        info!(story_id = %self.story_id, "shell terminated");
    }
}

/// Hands out a fresh [`LoggingShell`] per story start.
#[derive(Debug, Default)]
pub struct LoggingShellHost;

#[async_trait]
impl StoryShellHost for LoggingShellHost {
    async fn launch_shell(&self, context: ShellContext) -> Result<Arc<dyn StoryShell>, StoryError> {
        info!(story_id = %context.story_id(), "shell launched");
        Ok(Arc::new(LoggingShell {
            story_id: context.story_id().to_string(),
        }))
    }
}
