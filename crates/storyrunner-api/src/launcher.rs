//! In-process module launcher.
//!
//! Each module runs as its own tokio task holding its module context. The
//! task serves control messages until it is asked to stop or is aborted.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use storyrunner_controller::{LaunchedModule, ModuleContext, ModuleInstance, ModuleLauncher};
use storyrunner_core::error::StoryError;
use storyrunner_core::module::{ModuleManifest, ModulePath, SurfaceHandle};

const CONTROL_CAPACITY: usize = 8;

/// Messages sent to a module task.
#[derive(Debug)]
enum ModuleMessage {
    /// Stop and acknowledge once done.
    Stop(oneshot::Sender<()>),
}

/// Launches every module as a tokio task in this process.
#[derive(Debug, Clone, Default)]
pub struct LocalModuleLauncher {
    running: Arc<Mutex<BTreeSet<ModulePath>>>,
}

impl LocalModuleLauncher {
    /// Creates a launcher with no running modules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths of the module tasks currently alive.
    pub fn running(&self) -> Vec<ModulePath> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModuleLauncher for LocalModuleLauncher {
    async fn launch(
        &self,
        manifest: &ModuleManifest,
        context: ModuleContext,
    ) -> Result<LaunchedModule, StoryError> {
        let path = context.module_path().clone();
        if manifest.url.is_empty() {
            return Err(StoryError::LaunchFailure {
                path,
                reason: "empty module url".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(CONTROL_CAPACITY);
        let registration = Registration::new(Arc::clone(&self.running), path.clone());
        let task = tokio::spawn(module_task(
            manifest.url.clone(),
            context,
            registration,
            receiver,
        ));
        info!(module = %path, url = %manifest.url, "local module launched");

        Ok(LaunchedModule {
            instance: Box::new(LocalModule { sender, task }),
            surface: Some(SurfaceHandle::new()),
        })
    }
}

/// Handle of one module task.
struct LocalModule {
    sender: mpsc::Sender<ModuleMessage>,
    task: JoinHandle<()>,
}

#[async_trait]
impl ModuleInstance for LocalModule {
    async fn stop(&self) {
        let (ack, acknowledged) = oneshot::channel();
        if self.sender.send(ModuleMessage::Stop(ack)).await.is_err() {
            // The task already exited.
            return;
        }
        let _ = acknowledged.await;
    }

    fn kill(&self) {
        self.task.abort();
    }
}

/// Keeps a module listed as running for as long as its task lives, including
/// when the task is aborted.
struct Registration {
    running: Arc<Mutex<BTreeSet<ModulePath>>>,
    path: ModulePath,
}

impl Registration {
    fn new(running: Arc<Mutex<BTreeSet<ModulePath>>>, path: ModulePath) -> Self {
        running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone());
        Self { running, path }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Module task (runs in separate tokio task).
async fn module_task(
    url: String,
    context: ModuleContext,
    registration: Registration,
    mut receiver: mpsc::Receiver<ModuleMessage>,
) {
    debug!(module = %context.module_path(), %url, "module task running");
    while let Some(message) = receiver.recv().await {
        match message {
            ModuleMessage::Stop(ack) => {
                debug!(module = %context.module_path(), "module task stopping");
                // Release the context before acknowledging.
                drop(context);
                drop(registration);
                let _ = ack.send(());
                return;
            }
        }
    }
}
