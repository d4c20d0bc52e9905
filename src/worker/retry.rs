//! The retry directive: a typed signal that a task should be
//! rescheduled rather than finalized as failed.
//!
//! The directive carries no scheduling logic. The execution layer
//! interprets it, resolves the effective delay and retry budget, and
//! re-enqueues the task through the queue client; the consumed message
//! is deleted like any settled one.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Resolves a task-specific retry ceiling from the task's arguments.
pub type MaxRetriesFn = Arc<dyn Fn(&Value) -> u32 + Send + Sync>;

/// Signal raised by a task handler to request rescheduling.
#[derive(Clone, Default)]
pub struct Retry {
    /// Delivery delay for the re-enqueued task. Falls back to the
    /// configured default delay.
    pub delay: Option<Duration>,
    /// Whether this attempt consumes the retry budget. `Some(false)`
    /// lets infrastructure-transient failures retry for free. Falls
    /// back to the configured default.
    pub count_retries: Option<bool>,
    /// Dynamic retry ceiling. Falls back to the envelope's budget.
    pub max_retries: Option<MaxRetriesFn>,
}

impl Retry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count_retries(mut self, count: bool) -> Self {
        self.count_retries = Some(count);
        self
    }

    pub fn max_retries<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> u32 + Send + Sync + 'static,
    {
        self.max_retries = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("delay", &self.delay)
            .field("count_retries", &self.count_retries)
            .field("max_retries", &self.max_retries.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
