//! Shared harness for story controller tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use storyrunner_controller::{ControllerConfig, StoryCollaborators, StoryController, StoryShellHost};
use storyrunner_core::ledger::LedgerPage;
use storyrunner_core::module::{
    ModuleIntent, ModulePath, ModuleSource, ModuleSurface, SurfaceRelation,
};
use storyrunner_ledger::InMemoryPage;
use storyrunner_test_support::{
    DelayedPage, FixedClock, RecordingShell, RecordingShellHost, ScriptedLauncher, StaticResolver,
};

/// A controller wired to scripted collaborators that tests can inspect.
pub struct Harness {
    pub controller: StoryController,
    pub launcher: ScriptedLauncher,
    pub shell_host: Arc<RecordingShellHost>,
    pub page: Arc<InMemoryPage>,
}

impl Harness {
    /// The shell handed out by the harness host.
    pub fn shell(&self) -> Arc<RecordingShell> {
        self.shell_host.shell()
    }
}

/// Builder for a [`Harness`].
pub struct HarnessBuilder {
    launcher: ScriptedLauncher,
    shell_host: RecordingShellHost,
    resolver: StaticResolver,
    config: ControllerConfig,
    page: Arc<InMemoryPage>,
}

impl HarnessBuilder {
    pub fn launcher(mut self, launcher: ScriptedLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn shell_host(mut self, shell_host: RecordingShellHost) -> Self {
        self.shell_host = shell_host;
        self
    }

    pub fn resolver(mut self, resolver: StaticResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn page(mut self, page: Arc<InMemoryPage>) -> Self {
        self.page = page;
        self
    }

    pub fn build(self) -> Harness {
        let shell_host = Arc::new(self.shell_host);
        let collaborators = StoryCollaborators::new(
            Arc::clone(&self.page) as Arc<dyn LedgerPage>,
            Arc::new(self.launcher.clone()),
            Arc::clone(&shell_host) as Arc<dyn StoryShellHost>,
        )
        .with_resolver(Arc::new(self.resolver))
        .with_clock(Arc::new(FixedClock::pinned()));
        let controller = StoryController::spawn("story-1", collaborators, self.config);

        Harness {
            controller,
            launcher: self.launcher,
            shell_host,
            page: self.page,
        }
    }
}

/// Starts building a harness with default collaborators.
pub fn harness_builder() -> HarnessBuilder {
    HarnessBuilder {
        launcher: ScriptedLauncher::new(),
        shell_host: RecordingShellHost::new(),
        resolver: StaticResolver::new(),
        config: ControllerConfig::default().with_module_stop_timeout(Duration::from_millis(200)),
        page: Arc::new(InMemoryPage::new()),
    }
}

/// A harness with default collaborators.
pub fn harness() -> Harness {
    harness_builder().build()
}

/// A controller on a page that holds notifications until released.
pub fn controller_on_delayed_page(page: &Arc<DelayedPage>) -> StoryController {
    let collaborators = StoryCollaborators::new(
        Arc::clone(page) as Arc<dyn LedgerPage>,
        Arc::new(ScriptedLauncher::new()),
        Arc::new(RecordingShellHost::new()),
    )
    .with_clock(Arc::new(FixedClock::pinned()));
    StoryController::spawn("story-1", collaborators, ControllerConfig::default())
}

pub fn path(segments: &[&str]) -> ModulePath {
    ModulePath::from_segments(segments.iter().copied())
}

pub fn intent(url: &str) -> ModuleIntent {
    ModuleIntent::for_url(url)
}

/// Starts a module whose surface goes to the shell.
pub async fn start_in_shell(
    controller: &StoryController,
    parent: &[&str],
    name: &str,
    url: &str,
) -> Result<(), storyrunner_core::error::StoryError> {
    controller
        .start_module(
            path(parent),
            name,
            intent(url),
            ModuleSurface::InShell(SurfaceRelation::default()),
            ModuleSource::Internal,
        )
        .await
        .map(|_| ())
}
