//! Deterministic clock for story tests.

use chrono::{DateTime, Utc};
use storyrunner_core::clock::Clock;

/// A clock that always returns the same instant, so focus times and context
/// log entries can be asserted exactly.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl FixedClock {
    /// A clock pinned to `2026-01-15T10:00:00Z`.
    #[must_use]
    pub fn pinned() -> Self {
        use chrono::TimeZone;
        Self(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}
