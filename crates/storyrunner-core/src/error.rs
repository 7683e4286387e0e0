//! Story error taxonomy.

use thiserror::Error;

use crate::link::LinkPath;
use crate::module::ModulePath;

/// Errors reported to the caller of a story operation.
///
/// None of these abort the operation queue; the queue always proceeds to the
/// next operation once the failing one has replied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    /// The parent path does not resolve to a running module.
    #[error("invalid parent module: {0}")]
    InvalidParent(ModulePath),

    /// A module with this path is already running.
    #[error("duplicate module name: {0}")]
    DuplicateModuleName(ModulePath),

    /// The module launcher failed to bring the module up.
    #[error("failed to launch module {path}: {reason}")]
    LaunchFailure {
        /// The module that failed to launch.
        path: ModulePath,
        /// Launcher-provided reason.
        reason: String,
    },

    /// No manifest could be resolved for the requested module.
    #[error("manifest resolution failed: {0}")]
    ManifestResolutionFailure(String),

    /// No record exists for the link. Connecting creates it instead.
    #[error("link not found: {0}")]
    LinkNotFound(LinkPath),

    /// The module did not acknowledge its stop request in time and was
    /// force-terminated.
    #[error("module {path} did not acknowledge stop within {timeout_ms} ms")]
    Timeout {
        /// The module that timed out.
        path: ModulePath,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The module was already stopped.
    #[error("module already stopped: {0}")]
    AlreadyStopped(ModulePath),

    /// No running module exists at the path.
    #[error("module not running: {0}")]
    NotRunning(ModulePath),

    /// A write was attempted through a read-only link connection.
    #[error("link connection is read-only: {0}")]
    ReadOnlyLink(LinkPath),

    /// The story controller no longer executes operations.
    #[error("story controller is halted")]
    Halted,

    /// A ledger read or write failed.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The story shell rejected a request or could not be launched.
    #[error("story shell error: {0}")]
    Shell(String),
}
