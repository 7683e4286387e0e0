//! Recording story shell that keeps every request for later assertions.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storyrunner_controller::domain::container::ContainerView;
use storyrunner_controller::{ShellContext, StoryShell, StoryShellHost};
use storyrunner_core::error::StoryError;
use storyrunner_core::module::{ModulePath, SurfaceHandle, SurfaceRelation};

/// A request received by the [`RecordingShell`].
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    /// A surface was attached.
    Attached {
        /// Module owning the surface.
        owner: ModulePath,
        /// Module it was attached to.
        anchor: Option<ModulePath>,
        /// The surface.
        surface: SurfaceHandle,
    },
    /// A surface was focused.
    Focused(ModulePath),
    /// A surface was defocused.
    Defocused(ModulePath),
    /// A container was added.
    Container(ContainerView),
    /// The shell was terminated.
    Terminated,
}

/// A story shell that records requests. It accepts every surface except
/// those of owners passed to [`RecordingShell::reject`].
#[derive(Debug, Default)]
pub struct RecordingShell {
    events: Mutex<Vec<ShellEvent>>,
    rejected: Mutex<BTreeSet<ModulePath>>,
}

impl RecordingShell {
    /// Makes later attach requests for `owner` fail.
    pub fn reject(&self, owner: ModulePath) {
        self.rejected.lock().unwrap().insert(owner);
    }

    /// All requests so far, in order.
    pub fn events(&self) -> Vec<ShellEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Owners of attached surfaces, in attach order.
    pub fn attached_owners(&self) -> Vec<ModulePath> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ShellEvent::Attached { owner, .. } => Some(owner),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ShellEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl StoryShell for RecordingShell {
    async fn attach_surface(
        &self,
        owner: &ModulePath,
        anchor: Option<&ModulePath>,
        surface: SurfaceHandle,
        _relation: &SurfaceRelation,
    ) -> Result<(), StoryError> {
        if self.rejected.lock().unwrap().contains(owner) {
            return Err(StoryError::Shell(format!("surface of {owner} rejected")));
        }
        self.record(ShellEvent::Attached {
            owner: owner.clone(),
            anchor: anchor.cloned(),
            surface,
        });
        Ok(())
    }

    async fn focus_surface(&self, owner: &ModulePath) -> Result<(), StoryError> {
        self.record(ShellEvent::Focused(owner.clone()));
        Ok(())
    }

    async fn defocus_surface(&self, owner: &ModulePath) -> Result<(), StoryError> {
        self.record(ShellEvent::Defocused(owner.clone()));
        Ok(())
    }

    async fn add_container(&self, container: ContainerView) -> Result<(), StoryError> {
        self.record(ShellEvent::Container(container));
        Ok(())
    }

    async fn terminate(&self) {
        self.record(ShellEvent::Terminated);
    }
}

/// Hands out one shared [`RecordingShell`], or fails every launch.
#[derive(Debug, Default)]
pub struct RecordingShellHost {
    shell: Arc<RecordingShell>,
    fail: bool,
    contexts: Mutex<Vec<ShellContext>>,
}

impl RecordingShellHost {
    /// A host whose launches succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose launches fail with [`StoryError::Shell`].
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The shell handed out by this host.
    pub fn shell(&self) -> Arc<RecordingShell> {
        Arc::clone(&self.shell)
    }

    /// Number of shells launched.
    pub fn launches(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    /// Context handed to the most recent shell.
    pub fn last_context(&self) -> Option<ShellContext> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StoryShellHost for RecordingShellHost {
    async fn launch_shell(&self, context: ShellContext) -> Result<Arc<dyn StoryShell>, StoryError> {
        if self.fail {
            return Err(StoryError::Shell("scripted shell failure".to_owned()));
        }
        self.contexts.lock().unwrap().push(context);
        Ok(self.shell())
    }
}
