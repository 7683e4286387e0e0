//! HTTP API server hosting one story controller.

pub mod config;
pub mod error;
pub mod launcher;
pub mod routes;
pub mod shell;
pub mod state;
