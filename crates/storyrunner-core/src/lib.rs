//! Story Runner Core: shared story vocabulary.
//!
//! This crate defines the records, paths, error taxonomy and persistence
//! port that the controller and its collaborators agree on. It contains no
//! orchestration and no infrastructure code.

pub mod clock;
pub mod error;
pub mod ledger;
pub mod link;
pub mod module;
pub mod story;
