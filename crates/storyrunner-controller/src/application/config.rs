//! Controller configuration.

use std::time::Duration;

/// Default bound on a module's stop acknowledgement.
pub const DEFAULT_MODULE_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Default per-subscriber buffer of each watcher channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Context topic the default importance policy compares.
pub const DEFAULT_IMPORTANCE_TOPIC: &str = "location/home_work";

/// Tunables of one story controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long a module gets to acknowledge a stop before it is killed.
    pub module_stop_timeout: Duration,
    /// Buffer of each story, module and link watcher channel.
    pub notification_capacity: usize,
    /// Context topics the default importance policy compares.
    pub importance_topics: Vec<String>,
    /// Device recorded in context log entries.
    pub device_id: String,
}

impl ControllerConfig {
    /// Sets the stop acknowledgement deadline.
    #[must_use]
    pub fn with_module_stop_timeout(mut self, timeout: Duration) -> Self {
        self.module_stop_timeout = timeout;
        self
    }

    /// Sets the watcher buffer size. Zero is raised to one.
    #[must_use]
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }

    /// Replaces the importance topics.
    #[must_use]
    pub fn with_importance_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.importance_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the device id.
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Stop deadline in whole milliseconds, saturating.
    #[must_use]
    pub fn module_stop_timeout_ms(&self) -> u64 {
        u64::try_from(self.module_stop_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            module_stop_timeout: DEFAULT_MODULE_STOP_TIMEOUT,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            importance_topics: vec![DEFAULT_IMPORTANCE_TOPIC.to_owned()],
            device_id: "local".to_owned(),
        }
    }
}
