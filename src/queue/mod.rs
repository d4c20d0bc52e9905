//! Queue backend capability traits.
//!
//! `QueueClient` resolves names/prefixes to handles and enqueues
//! payloads; `QueueHandle` is one resolved queue exposing receive and
//! batch delete. The service depends only on these traits — the AWS
//! implementation lives in [`sqs`], and tests substitute an in-memory
//! fake.

pub mod sqs;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Message attribute holding the backend's approximate delivery count.
pub const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";

/// One unit of retrieved work: opaque serialized payload plus the
/// delivery metadata needed to delete it.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub receipt_handle: String,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Approximate number of times this message has been delivered,
    /// if the backend reported it.
    pub fn receive_count(&self) -> Option<u32> {
        self.attributes
            .get(RECEIVE_COUNT_ATTRIBUTE)
            .and_then(|v| v.parse().ok())
    }
}

/// Identity + receipt handle of a settled message, queued for deletion.
#[derive(Debug, Clone)]
pub struct DeleteEntry {
    pub id: String,
    pub receipt_handle: String,
}

/// Result of a batch delete. Entries the backend refused stay invisible
/// until the visibility timeout lapses and are then redelivered.
#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    pub failed_ids: Vec<String>,
}

/// One resolved queue.
#[async_trait]
pub trait QueueHandle: Send + Sync {
    /// Stable backend identity (URL for SQS). Queue sets are
    /// deduplicated on this.
    fn url(&self) -> &str;

    /// Short human name for logging.
    fn name(&self) -> &str;

    /// Long-poll for up to `max_messages`, blocking up to `wait_time_s`
    /// seconds for at least one. Returns immediately once any arrive;
    /// may return an empty batch.
    async fn receive(&self, max_messages: u32, wait_time_s: u32) -> Result<Vec<Message>>;

    /// Batch-delete settled messages, reporting per-entry failures.
    async fn delete(&self, entries: &[DeleteEntry]) -> Result<DeleteOutcome>;
}

/// Resolves queue names to handles and enqueues payloads.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueue a payload with a delivery delay. Fails with
    /// [`Error::QueueDoesNotExist`](crate::error::Error::QueueDoesNotExist)
    /// when the queue is absent and auto-creation is disabled.
    async fn add_message(&self, queue_name: &str, body: &str, delay_s: u32) -> Result<()>;

    /// Resolve literal names. Any unresolved name is an error — callers
    /// treat this as fatal at startup.
    async fn get_queues_by_names(&self, names: &[String]) -> Result<Vec<Arc<dyn QueueHandle>>>;

    /// Union of all queues whose name starts with any given prefix.
    /// Used only for periodic dynamic discovery.
    async fn get_queues_by_prefixes(&self, prefixes: &[String])
    -> Result<Vec<Arc<dyn QueueHandle>>>;
}
