//! Story Runner Ledger: ledger pages kept in process memory.
//!
//! Pages behave like synchronized ledger pages: every write that changes a
//! value is broadcast to the page's watchers, which is how a story controller
//! observes records written by other devices.

pub mod in_memory_page;

pub use in_memory_page::{InMemoryLedger, InMemoryPage};
