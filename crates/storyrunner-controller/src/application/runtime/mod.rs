//! The story runtime: a single task owning all story state.
//!
//! Operations arrive on an unbounded channel and are moved into the
//! [`OperationQueue`], which hands them out one at a time. An operation may
//! await collaborators while it runs; nothing else touches the story state
//! until it completes.

mod links;
mod modules;
mod shell;
mod story;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use storyrunner_core::clock::Clock;
use storyrunner_core::error::StoryError;
use storyrunner_core::story::{StoryData, StoryState};

use super::config::ControllerConfig;
use super::controller::{StoryCollaborators, StoryController};
use super::operations::{Envelope, Operation, Reply};
use super::page::StoryPage;
use super::ports::{
    ImportancePolicy, ModuleInstance, ModuleLauncher, ModuleResolver, StoryShell,
    StoryShellHost,
};
use super::watch::{ActiveLinks, ActiveModules, StoryWatch};
use crate::domain::chain_registry::ChainRegistry;
use crate::domain::events::{EmbedRequest, StoryEvent, Watchers};
use crate::domain::link_registry::LinkRegistry;
use crate::domain::module_graph::ModuleGraph;
use crate::domain::operation_queue::OperationQueue;
use crate::domain::shell_tracker::ShellTracker;
use crate::domain::story_state::StoryStateMachine;

/// Live handles of a running module.
pub(crate) struct ModuleConnection {
    instance: Box<dyn ModuleInstance>,
    route: SurfaceRoute,
}

/// Who receives focus requests for a module's surface.
enum SurfaceRoute {
    /// The story shell holds the surface.
    Shell,
    /// Another module embeds the surface and watches for requests.
    Embedder(mpsc::UnboundedSender<EmbedRequest>),
    /// Nobody; the module is headless or its surface went unclaimed.
    Unrouted,
}

enum Flow {
    Continue,
    /// Stop serving; the reply is sent once the inbox is closed.
    Halt(Reply<()>),
}

pub(crate) struct StoryRuntime {
    story_id: Arc<str>,
    config: ControllerConfig,
    page: StoryPage,
    launcher: Arc<dyn ModuleLauncher>,
    shell_host: Arc<dyn StoryShellHost>,
    resolver: Arc<dyn ModuleResolver>,
    importance: Arc<dyn ImportancePolicy>,
    clock: Arc<dyn Clock>,

    handle: mpsc::WeakUnboundedSender<Envelope>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    bridge: JoinHandle<()>,
    queue: OperationQueue<Envelope>,

    graph: ModuleGraph<ModuleConnection>,
    links: LinkRegistry,
    chains: ChainRegistry,
    views: ShellTracker,
    shell: Option<Arc<dyn StoryShell>>,
    story: StoryStateMachine,
    watchers: Watchers,

    story_url: Option<String>,
    last_focus_time: Option<DateTime<Utc>>,
    extra: BTreeMap<String, String>,
}

impl StoryRuntime {
    pub(crate) fn new(
        story_id: Arc<str>,
        collaborators: StoryCollaborators,
        importance: Arc<dyn ImportancePolicy>,
        config: ControllerConfig,
        handle: mpsc::WeakUnboundedSender<Envelope>,
        inbox: mpsc::UnboundedReceiver<Envelope>,
        bridge: JoinHandle<()>,
    ) -> Self {
        let watchers = Watchers::new(config.notification_capacity);
        Self {
            story_id,
            page: StoryPage::new(collaborators.ledger),
            launcher: collaborators.launcher,
            shell_host: collaborators.shell_host,
            resolver: collaborators.resolver,
            importance,
            clock: collaborators.clock,
            config,
            handle,
            inbox,
            bridge,
            queue: OperationQueue::new(),
            graph: ModuleGraph::new(),
            links: LinkRegistry::new(),
            chains: ChainRegistry::new(),
            views: ShellTracker::new(),
            shell: None,
            story: StoryStateMachine::new(),
            watchers,
            story_url: None,
            last_focus_time: None,
            extra: BTreeMap::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        self.restore_story_data().await;
        loop {
            self.absorb_inbox();
            let envelope = match self.queue.begin_next() {
                Some(envelope) => envelope,
                None => match self.inbox.recv().await {
                    Some(envelope) => {
                        self.accept(envelope);
                        continue;
                    }
                    None => break,
                },
            };

            let span = info_span!(
                "operation",
                op = envelope.operation.name(),
                correlation_id = %envelope.correlation_id,
                story_id = %self.story_id,
            );
            match self.execute(envelope.operation).instrument(span).await {
                Flow::Continue => self.queue.complete(),
                Flow::Halt(reply) => {
                    self.absorb_inbox();
                    let dropped = self.queue.halt();
                    self.inbox.close();
                    info!(
                        story_id = %self.story_id,
                        dropped = dropped.len(),
                        "story controller halted"
                    );
                    respond(reply, Ok(()));
                    break;
                }
            }
        }
        self.bridge.abort();
        debug!(story_id = %self.story_id, "story runtime exited");
    }

    async fn execute(&mut self, operation: Operation) -> Flow {
        match operation {
            Operation::Start { reply } => respond(reply, self.start().await),
            Operation::Stop { reason, reply } => {
                self.stop_story(reason).await;
                if reason.halts() {
                    return Flow::Halt(reply);
                }
                respond(reply, Ok(()));
            }
            Operation::AddModule {
                parent,
                name,
                intent,
                relation,
                reply,
            } => respond(reply, self.add_module(parent, name, intent, relation).await),
            Operation::AddForCreate {
                name,
                intent,
                link,
                reply,
            } => respond(reply, self.add_for_create(name, intent, link).await),
            Operation::StartModule { request, reply } => {
                respond(reply, self.start_module(request).await);
            }
            Operation::EmbedModule { request, reply } => {
                respond(reply, self.embed_module(request).await);
            }
            Operation::StartContainer { request, reply } => {
                respond(reply, self.start_container(request).await);
            }
            Operation::StopModule { path, reply } => respond(reply, self.stop_module(path).await),
            Operation::ModuleStateChanged { path, state } => {
                self.set_module_state(&path, state).await;
            }
            Operation::FocusModule { path, reply } => respond(reply, self.focus_module(path).await),
            Operation::DefocusModule { path, reply } => {
                respond(reply, self.defocus_module(path).await);
            }
            Operation::RequestStoryFocus { reply } => {
                self.watchers.story(StoryEvent::FocusRequested);
                respond(reply, Ok(()));
            }
            Operation::ConnectLink {
                path,
                connection_type,
                reply,
            } => respond(reply, self.connect_link(path, connection_type).await),
            Operation::WriteLink {
                path,
                connection,
                value,
                reply,
            } => respond(reply, self.write_link(path, connection, value).await),
            Operation::DisposeLink { path, connection } => self.dispose_link(&path, connection),
            Operation::LinkPathForChainKey {
                module_path,
                key,
                reply,
            } => respond(reply, Ok(self.chains.link_path_for_key(&module_path, &key))),
            Operation::GetInfo { reply } => respond(reply, Ok(self.info())),
            Operation::SetInfoExtra { name, value, reply } => {
                respond(reply, self.set_info_extra(name, value).await);
            }
            Operation::GetModules { reply } => respond(reply, self.page.read_modules().await),
            Operation::GetActiveModules { reply } => respond(
                reply,
                Ok(ActiveModules {
                    modules: self.graph.running().map(|record| record.data.clone()).collect(),
                    events: self.watchers.subscribe_modules(),
                }),
            ),
            Operation::GetActiveLinks { reply } => respond(
                reply,
                Ok(ActiveLinks {
                    links: self.links.paths(),
                    events: self.watchers.subscribe_links(),
                }),
            ),
            Operation::WatchStory { reply } => respond(
                reply,
                Ok(StoryWatch {
                    state: self.story.state(),
                    events: self.watchers.subscribe_story(),
                }),
            ),
            Operation::GetModuleController { path, reply } => {
                respond(reply, self.module_controller(path));
            }
            Operation::WatchModule { path, reply } => respond(reply, self.watch_module(path)),
            Operation::Log {
                signal,
                context,
                reply,
            } => respond(reply, self.log(signal, context).await),
            Operation::GetImportance { context, reply } => {
                respond(reply, self.importance(&context).await);
            }
            Operation::Sync { reply } => respond(reply, Ok(())),
            Operation::LedgerNotification { change } => self.ledger_notification(change).await,
        }
        Flow::Continue
    }

    /// A strong handle for contexts given out by the running operation.
    fn handle(&self) -> Result<StoryController, StoryError> {
        self.handle
            .upgrade()
            .map(|sender| StoryController::from_sender(Arc::clone(&self.story_id), sender))
            .ok_or(StoryError::Halted)
    }

    /// Queues an operation behind everything submitted so far.
    fn enqueue_followup(&mut self, operation: Operation) {
        self.absorb_inbox();
        self.accept(Envelope::new(operation));
    }

    fn absorb_inbox(&mut self) {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.accept(envelope);
        }
    }

    fn accept(&mut self, envelope: Envelope) {
        if let Err(rejected) = self.queue.enqueue(envelope) {
            debug!(op = rejected.operation.name(), "operation rejected by halted queue");
        }
    }

    fn story_data(&self) -> StoryData {
        StoryData {
            story_id: self.story_id.to_string(),
            state: self.story.state(),
            extra: self.extra.clone(),
        }
    }

    /// Pushes a new story state to watchers and writes it behind.
    async fn announce_story_state(&self, state: StoryState) {
        self.watchers.story(StoryEvent::StateChanged(state));
        if let Err(error) = self.page.write_story(&self.story_data()).await {
            warn!(%error, "failed to persist story state");
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, StoryError>) {
    if let Err(error) = &result {
        debug!(%error, "operation failed");
    }
    // The caller may have stopped waiting.
    let _ = reply.send(result);
}

/// A reply channel nobody listens to, for operations queued internally.
fn detached<T>() -> Reply<T> {
    oneshot::channel().0
}
