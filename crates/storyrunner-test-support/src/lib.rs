//! Shared test mocks and utilities for the story runner.

mod clock;
mod delayed;
mod launcher;
mod ledger;
mod resolver;
mod shell;

pub use clock::FixedClock;
pub use delayed::DelayedPage;
pub use launcher::ScriptedLauncher;
pub use ledger::FailingLedgerPage;
pub use resolver::StaticResolver;
pub use shell::{RecordingShell, RecordingShellHost, ShellEvent};
