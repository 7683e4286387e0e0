//! FIFO operation serializer.
//!
//! Operations run strictly one at a time in submission order. An operation
//! may enqueue more operations while it runs; those land behind everything
//! already queued. A halting operation leaves the queue in [`QueueStatus::Halted`]
//! for good: nothing queued before or after it runs again.

use std::collections::VecDeque;

/// Lifecycle of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// No operation is executing.
    Idle,
    /// An operation has been handed out and has not completed.
    Running,
    /// Terminal: no further operation is handed out.
    Halted,
}

/// Queue of pending operations plus the execution status.
#[derive(Debug)]
pub struct OperationQueue<T> {
    pending: VecDeque<T>,
    status: QueueStatus,
}

impl<T> OperationQueue<T> {
    /// Creates an idle, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            status: QueueStatus::Idle,
        }
    }

    /// Appends an operation to the tail. Returns the operation back if the
    /// queue is halted.
    ///
    /// # Errors
    ///
    /// Returns `Err(operation)` when the queue is halted.
    pub fn enqueue(&mut self, operation: T) -> Result<(), T> {
        if self.status == QueueStatus::Halted {
            return Err(operation);
        }
        self.pending.push_back(operation);
        Ok(())
    }

    /// Hands out the next operation and marks the queue running.
    ///
    /// Returns `None` when nothing is pending or the queue is halted.
    ///
    /// # Panics
    ///
    /// Panics if an operation is already running; two operations must never
    /// observe the story state at the same time.
    pub fn begin_next(&mut self) -> Option<T> {
        assert!(
            self.status != QueueStatus::Running,
            "operation queue re-entered while an operation is running"
        );
        if self.status == QueueStatus::Halted {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.status = QueueStatus::Running;
        Some(next)
    }

    /// Marks the running operation complete.
    ///
    /// # Panics
    ///
    /// Panics if no operation is running.
    pub fn complete(&mut self) {
        assert_eq!(
            self.status,
            QueueStatus::Running,
            "operation completed while none was running"
        );
        self.status = QueueStatus::Idle;
    }

    /// Enters the terminal state and returns the operations that will never
    /// run.
    pub fn halt(&mut self) -> Vec<T> {
        self.status = QueueStatus::Halted;
        self.pending.drain(..).collect()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        self.status
    }

    /// Returns `true` once halted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.status == QueueStatus::Halted
    }

    /// Number of operations waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no operation is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for OperationQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
