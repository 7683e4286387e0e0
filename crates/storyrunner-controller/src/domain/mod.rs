//! Domain layer: story bookkeeping owned by the controller runtime.
//!
//! Nothing here is shared between tasks; the runtime owns every structure and
//! mutates it from one operation at a time.

pub mod chain_registry;
pub mod container;
pub mod echo_filter;
pub mod events;
pub mod link_registry;
pub mod module_graph;
pub mod operation_queue;
pub mod shell_tracker;
pub mod story_state;
