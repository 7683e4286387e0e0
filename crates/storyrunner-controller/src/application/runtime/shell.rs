//! Delivery of surfaces and containers to the story shell.

use tracing::{debug, warn};

use storyrunner_core::error::StoryError;
use storyrunner_core::module::{ModuleSource, ModuleSurface};

use super::{StoryRuntime, SurfaceRoute};
use crate::application::operations::{ContainerRequest, StartRequest};
use crate::domain::container::ContainerView;

impl StoryRuntime {
    /// Hands every deliverable pending surface to the shell. Surfaces
    /// anchored to a rejected surface stay pending.
    pub(super) async fn process_pending_views(&mut self) {
        let Some(shell) = self.shell.clone() else {
            return;
        };
        loop {
            let ready = self.views.take_ready(&self.graph);
            if ready.is_empty() {
                return;
            }
            for view in ready {
                debug!(module = %view.module_path, anchor = ?view.anchor, "attaching surface");
                match shell
                    .attach_surface(
                        &view.module_path,
                        view.anchor.as_ref(),
                        view.surface,
                        &view.relation,
                    )
                    .await
                {
                    Ok(()) => self.views.mark_connected(view.module_path),
                    Err(error) => {
                        warn!(module = %view.module_path, %error, "shell rejected surface");
                    }
                }
            }
        }
    }

    /// Starts each container node as an embedded child of the container's
    /// parent and hands the container to the shell. Nodes that fail to start
    /// are left out.
    pub(super) async fn start_container(
        &mut self,
        request: ContainerRequest,
    ) -> Result<(), StoryError> {
        if !request.parent.is_root() && !self.graph.is_running(&request.parent) {
            return Err(StoryError::InvalidParent(request.parent));
        }
        let Some(shell) = self.shell.clone() else {
            return Err(StoryError::Shell("no story shell attached".to_owned()));
        };

        let mut views = Vec::with_capacity(request.nodes.len());
        for node in request.nodes {
            let start_path = request.parent.child(node.node_name.clone());
            let start = StartRequest {
                parent: request.parent.clone(),
                name: node.node_name.clone(),
                intent: node.intent,
                surface: ModuleSurface::Embedded,
                source: ModuleSource::Internal,
            };
            match self.start_module(start).await {
                Ok(Some(surface)) => {
                    self.route_surface(&start_path, SurfaceRoute::Shell);
                    views.push((node.node_name, surface));
                }
                Ok(None) => debug!(node = %node.node_name, "container node has no surface"),
                Err(error) => {
                    warn!(node = %node.node_name, %error, "container node failed to start");
                }
            }
        }

        shell
            .add_container(ContainerView {
                container_name: request.name,
                parent: request.parent,
                layout: request.layout,
                relationships: request.relationships,
                views,
            })
            .await
    }
}
