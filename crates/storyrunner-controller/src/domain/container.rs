//! Container layouts handed to the story shell.

use serde::{Deserialize, Serialize};

use storyrunner_core::module::{ModuleIntent, ModulePath, SurfaceHandle, SurfaceRelation};

/// Placement of one region of a container, in fractions of the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLayout {
    /// Region name nodes are placed into.
    pub region: String,
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

/// Relation between two nodes of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRelation {
    /// The dependent node.
    pub node: String,
    /// The node it relates to.
    pub parent_node: String,
    /// How the two relate.
    pub relation: SurfaceRelation,
}

/// A module to start as one node of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerNode {
    /// Node name; also the module name below the container's parent.
    pub node_name: String,
    /// What to run in the node.
    pub intent: ModuleIntent,
}

/// A container, with the surfaces of its started nodes, as given to the shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerView {
    /// Container name.
    pub container_name: String,
    /// Module the container belongs to.
    pub parent: ModulePath,
    /// Region layouts.
    pub layout: Vec<ContainerLayout>,
    /// Node relations.
    pub relationships: Vec<ContainerRelation>,
    /// Node name and surface of every node that produced one.
    pub views: Vec<(String, SurfaceHandle)>,
}
