//! Application layer: the story runtime and the handles that feed it.

pub mod config;
pub mod context;
pub mod controller;
mod notification_bridge;
pub mod operations;
pub mod page;
pub mod ports;
mod runtime;
pub mod watch;
