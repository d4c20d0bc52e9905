//! Default execution layer: a JSON task envelope dispatched through an
//! explicit name → handler registry.
//!
//! A handler signals retry by returning [`TaskError::Retry`]; the
//! worker interprets the directive, enforces the retry budget, and
//! re-enqueues a fresh envelope through the queue client. Malformed or
//! unroutable envelopes settle as handled failures so poison messages
//! are deleted instead of redelivered forever.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::QueueClient;
use crate::worker::{Retry, Worker};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Why a task run did not succeed.
pub enum TaskError {
    /// Reschedule instead of finalizing as failed.
    Retry(Retry),
    /// Terminal task failure; logged, message deleted, no retry.
    Failed(String),
}

/// One registered task implementation.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, args: &Value) -> std::result::Result<(), TaskError>;
}

/// Explicit name → handler map. Built once at startup; no dynamic
/// resolution.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a task name. Last registration wins.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(name)
    }
}

/// Wire format for one task.
///
/// `retry` counts budget-consuming attempts so far; `max_retries` is
/// the budget fixed at submission. `queue` names the home queue so a
/// retry lands back where the task came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    pub queue: String,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub max_retries: u32,
}

/// Build an envelope and enqueue it. Returns the task id.
pub async fn submit_task(
    client: &dyn QueueClient,
    config: &Config,
    queue: &str,
    name: &str,
    args: Value,
    delay_s: u32,
) -> Result<Uuid> {
    let envelope = TaskEnvelope {
        id: Uuid::new_v4(),
        name: name.to_string(),
        args,
        queue: queue.to_string(),
        retry: 0,
        max_retries: config.default_max_retries,
    };
    let body = serde_json::to_string(&envelope)?;
    client.add_message(queue, &body, delay_s).await?;
    tracing::debug!(task_id = %envelope.id, task = name, queue, "task submitted");
    Ok(envelope.id)
}

/// The built-in [`Worker`]: deserialize, route, run, settle.
pub struct TaskWorker {
    client: Arc<dyn QueueClient>,
    registry: Arc<TaskRegistry>,
    default_delay: Duration,
    default_count_retries: bool,
}

impl TaskWorker {
    pub fn new(client: Arc<dyn QueueClient>, registry: Arc<TaskRegistry>, config: &Config) -> Self {
        Self {
            client,
            registry,
            default_delay: Duration::from_secs(config.default_delay_s as u64),
            default_count_retries: config.default_count_retries,
        }
    }

    /// Interpret a retry directive: enforce the budget, then enqueue a
    /// fresh envelope. The consumed message is deleted by the service
    /// either way.
    async fn schedule_retry(&self, envelope: &TaskEnvelope, directive: Retry) -> Result<()> {
        let max_retries = match &directive.max_retries {
            Some(resolve) => resolve(&envelope.args),
            None => envelope.max_retries,
        };
        let counts = directive.count_retries.unwrap_or(self.default_count_retries);

        if counts && envelope.retry >= max_retries {
            return Err(Error::ExecutionFailed(format!(
                "task {} ({}) exhausted its retry budget of {}",
                envelope.id, envelope.name, max_retries
            )));
        }

        let mut next = envelope.clone();
        if counts {
            next.retry += 1;
        }

        let delay = directive.delay.unwrap_or(self.default_delay);
        let body = serde_json::to_string(&next)?;
        self.client
            .add_message(&next.queue, &body, delay.as_secs() as u32)
            .await?;

        tracing::info!(
            task_id = %next.id,
            task = %next.name,
            queue = %next.queue,
            retry = next.retry,
            delay_s = delay.as_secs(),
            "task rescheduled"
        );
        Ok(())
    }
}

#[async_trait]
impl Worker for TaskWorker {
    async fn execute(&self, body: &str) -> Result<()> {
        let envelope: TaskEnvelope = serde_json::from_str(body)
            .map_err(|e| Error::ExecutionFailed(format!("malformed task envelope: {e}")))?;

        let handler = self.registry.get(&envelope.name).ok_or_else(|| {
            Error::ExecutionFailed(format!(
                "no handler registered for task {:?} (id {})",
                envelope.name, envelope.id
            ))
        })?;

        match handler.run(&envelope.args).await {
            Ok(()) => {
                tracing::debug!(task_id = %envelope.id, task = %envelope.name, "task completed");
                Ok(())
            }
            Err(TaskError::Retry(directive)) => self.schedule_retry(&envelope, directive).await,
            Err(TaskError::Failed(msg)) => Err(Error::ExecutionFailed(format!(
                "task {} ({}) failed: {}",
                envelope.id, envelope.name, msg
            ))),
        }
    }
}
