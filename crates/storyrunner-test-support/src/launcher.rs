//! Scripted module launcher. Records launches and stops, and fails or hangs
//! on request.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storyrunner_controller::{LaunchedModule, ModuleContext, ModuleInstance, ModuleLauncher};
use storyrunner_core::error::StoryError;
use storyrunner_core::module::{ModuleManifest, ModulePath, SurfaceHandle};

#[derive(Debug, Default)]
struct Script {
    failing_urls: HashSet<String>,
    hanging_urls: HashSet<String>,
    headless_urls: HashSet<String>,
    launched: Vec<ModulePath>,
    stopped: Vec<ModulePath>,
    killed: Vec<ModulePath>,
    contexts: HashMap<ModulePath, ModuleContext>,
    surfaces: HashMap<ModulePath, SurfaceHandle>,
}

/// A module launcher driven by a script.
///
/// Every launched module gets a fresh surface unless its URL was marked
/// headless. Stops are acknowledged immediately unless the URL was marked as
/// hanging, in which case the stop never completes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLauncher {
    /// Creates a launcher that launches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes launches of `url` fail.
    #[must_use]
    pub fn failing(self, url: &str) -> Self {
        self.script.lock().unwrap().failing_urls.insert(url.to_owned());
        self
    }

    /// Makes modules of `url` ignore stop requests.
    #[must_use]
    pub fn hanging_on_stop(self, url: &str) -> Self {
        self.script.lock().unwrap().hanging_urls.insert(url.to_owned());
        self
    }

    /// Makes modules of `url` produce no surface.
    #[must_use]
    pub fn headless(self, url: &str) -> Self {
        self.script.lock().unwrap().headless_urls.insert(url.to_owned());
        self
    }

    /// Paths of launched modules, in launch order.
    pub fn launched(&self) -> Vec<ModulePath> {
        self.script.lock().unwrap().launched.clone()
    }

    /// Paths of modules that acknowledged a stop, in order.
    pub fn stopped(&self) -> Vec<ModulePath> {
        self.script.lock().unwrap().stopped.clone()
    }

    /// Paths of killed modules, in order.
    pub fn killed(&self) -> Vec<ModulePath> {
        self.script.lock().unwrap().killed.clone()
    }

    /// The context handed to the module at `path` on its last launch.
    pub fn context(&self, path: &ModulePath) -> Option<ModuleContext> {
        self.script.lock().unwrap().contexts.get(path).cloned()
    }

    /// The surface produced by the module at `path` on its last launch.
    pub fn surface(&self, path: &ModulePath) -> Option<SurfaceHandle> {
        self.script.lock().unwrap().surfaces.get(path).copied()
    }
}

#[async_trait]
impl ModuleLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        manifest: &ModuleManifest,
        context: ModuleContext,
    ) -> Result<LaunchedModule, StoryError> {
        let path = context.module_path().clone();
        let mut script = self.script.lock().unwrap();
        if script.failing_urls.contains(&manifest.url) {
            return Err(StoryError::LaunchFailure {
                path,
                reason: format!("scripted failure for {}", manifest.url),
            });
        }

        let surface = if script.headless_urls.contains(&manifest.url) {
            None
        } else {
            let surface = SurfaceHandle::new();
            script.surfaces.insert(path.clone(), surface);
            Some(surface)
        };
        let hangs = script.hanging_urls.contains(&manifest.url);
        script.launched.push(path.clone());
        script.contexts.insert(path.clone(), context);

        Ok(LaunchedModule {
            instance: Box::new(ScriptedInstance {
                path,
                hangs,
                script: Arc::clone(&self.script),
            }),
            surface,
        })
    }
}

struct ScriptedInstance {
    path: ModulePath,
    hangs: bool,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl ModuleInstance for ScriptedInstance {
    async fn stop(&self) {
        if self.hangs {
            std::future::pending::<()>().await;
        }
        let mut script = self.script.lock().unwrap();
        script.stopped.push(self.path.clone());
        script.contexts.remove(&self.path);
    }

    fn kill(&self) {
        let mut script = self.script.lock().unwrap();
        script.killed.push(self.path.clone());
        script.contexts.remove(&self.path);
    }
}
