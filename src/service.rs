//! The worker service: queue discovery, the polling/dispatch loop,
//! event hooks, liveness heartbeat, and cooperative shutdown.
//!
//! One logical dispatch loop per process; queues and messages within a
//! pass run sequentially. Scale horizontally by running more processes.
//!
//! Shutdown is a flag consulted only at the top of the main loop and
//! between queues within a pass — an in-flight poll→process→delete
//! sequence always finishes, and there is no hard deadline on a single
//! message's execution.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{self, Hook, ServiceEvents};
use crate::queue::{DeleteEntry, Message, QueueClient, QueueHandle};
use crate::worker::{Worker, WorkerFactory};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Loop tuning for the worker service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum messages per receive call.
    pub max_messages: u32,
    /// Long-poll wait per receive call, seconds.
    pub wait_time_s: u32,
    /// Sleep when the effective queue set is empty. Distinct from, and
    /// normally longer than, the poll wait.
    pub no_queues_wait: Duration,
    /// Marker turning a queue name into a dynamic-discovery directive.
    pub prefix_marker: String,
    /// Minimum interval between prefix discovery queries. Bounds the
    /// backend query rate independent of poll frequency.
    pub refresh_interval: Duration,
    /// Minimum interval between liveness file writes.
    pub min_heartbeat_period: Duration,
    /// Liveness file path.
    pub heartbeat_file: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time_s: 2,
            no_queues_wait: Duration::from_secs(5),
            prefix_marker: "prefix:".to_string(),
            refresh_interval: Duration::from_secs(10),
            min_heartbeat_period: Duration::from_secs(10),
            heartbeat_file: PathBuf::from("healthcheck.txt"),
        }
    }
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_messages: config.max_messages,
            wait_time_s: config.wait_time_s,
            no_queues_wait: Duration::from_secs(config.no_queues_wait_time_s),
            prefix_marker: config.prefix_marker.clone(),
            refresh_interval: Duration::from_secs(config.refresh_prefix_queues_s),
            min_heartbeat_period: Duration::from_secs(config.min_heartbeat_period_s),
            heartbeat_file: PathBuf::from(&config.heartbeat_file),
        }
    }
}

/// Drains one or more queues until shutdown is requested.
pub struct WorkerService {
    client: Arc<dyn QueueClient>,
    factory: Arc<dyn WorkerFactory>,
    observers: Vec<Arc<dyn ServiceEvents>>,
    config: ServiceConfig,
    shutdown: Arc<AtomicBool>,
    last_heartbeat: Option<Instant>,
}

impl WorkerService {
    pub fn new(
        client: Arc<dyn QueueClient>,
        factory: Arc<dyn WorkerFactory>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            client,
            factory,
            observers: Vec::new(),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_heartbeat: None,
        }
    }

    /// Subscribe an observer to the batch-lifecycle hooks.
    pub fn observe(&mut self, observer: Arc<dyn ServiceEvents>) {
        self.observers.push(observer);
    }

    /// Handle for the termination signal wiring: setting this flag
    /// requests graceful shutdown at the next loop or queue boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn terminating(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Resolve the queue set and run the polling loop until the
    /// shutdown flag is set.
    ///
    /// Literal names that fail to resolve are fatal; below that point
    /// every fault is isolated per queue and the loop keeps running.
    pub async fn process_queues(&mut self, queue_names: &[String]) -> Result<()> {
        self.write_heartbeat()?;

        debug!(queues = ?queue_names, "connecting to queue backend");

        let mut literal = Vec::new();
        let mut prefixes = Vec::new();
        for name in queue_names {
            match name.strip_prefix(&self.config.prefix_marker) {
                Some(prefix) => prefixes.push(prefix.to_string()),
                None => literal.push(name.clone()),
            }
        }

        let static_queues = self.client.get_queues_by_names(&literal).await?;
        let static_urls: HashSet<String> =
            static_queues.iter().map(|q| q.url().to_string()).collect();

        info!(
            static_queues = literal.len(),
            prefixes = prefixes.len(),
            max_messages = self.config.max_messages,
            wait_time_s = self.config.wait_time_s,
            refresh_interval_s = self.config.refresh_interval.as_secs(),
            "worker service starting"
        );

        let worker = self.factory.create()?;

        let mut queues = static_queues.clone();
        let mut last_refresh: Option<Instant> = None;

        while !self.terminating() {
            let refresh_due =
                last_refresh.is_none_or(|at| at.elapsed() >= self.config.refresh_interval);
            if !prefixes.is_empty() && refresh_due {
                match self.client.get_queues_by_prefixes(&prefixes).await {
                    Ok(dynamic) => {
                        queues = merge_queues(&static_queues, dynamic);
                        debug!(count = queues.len(), "refreshed queue set");
                    }
                    Err(e) => {
                        // Keep the previous set; a flapping backend is
                        // still queried at most once per interval.
                        warn!("prefix discovery failed: {e}");
                    }
                }
                last_refresh = Some(Instant::now());
            }

            if queues.is_empty() {
                debug!("no queues to process, backing off");
                tokio::time::sleep(self.config.no_queues_wait).await;
                continue;
            }

            self.process_messages(&queues, worker.as_ref(), &static_urls)
                .await;
        }

        info!("worker service stopped");
        Ok(())
    }

    /// One pass over the queue set, in input order. Aborts early if
    /// shutdown is requested between queues — never mid-queue.
    pub async fn process_messages(
        &mut self,
        queues: &[Arc<dyn QueueHandle>],
        worker: &dyn Worker,
        static_urls: &HashSet<String>,
    ) {
        for queue in queues {
            if self.terminating() {
                return;
            }

            match self.drain_queue(queue.as_ref(), worker).await {
                Ok(()) => {}
                Err(Error::QueueDoesNotExist(name)) if !static_urls.contains(queue.url()) => {
                    // Benign race: a dynamically-discovered queue was
                    // removed since the last refresh.
                    debug!(queue = %name, "queue already deleted, skipping");
                }
                Err(e) => {
                    warn!(queue = queue.name(), "queue pass failed: {e}");
                }
            }

            if self
                .last_heartbeat
                .is_none_or(|at| at.elapsed() >= self.config.min_heartbeat_period)
            {
                if let Err(e) = self.write_heartbeat() {
                    warn!("heartbeat write failed: {e}");
                }
            }
        }
    }

    /// Poll one queue, dispatch every received message, delete the
    /// settled batch. Every received message produces exactly one
    /// delete entry regardless of its execution outcome.
    async fn drain_queue(&self, queue: &dyn QueueHandle, worker: &dyn Worker) -> Result<()> {
        let messages = queue
            .receive(self.config.max_messages, self.config.wait_time_s)
            .await?;
        debug!(queue = queue.name(), count = messages.len(), "polled messages");

        event::emit(&self.observers, Hook::Received, &messages);

        let mut entries = Vec::with_capacity(messages.len());
        for msg in &messages {
            self.dispatch(worker, msg).await;
            entries.push(DeleteEntry {
                id: msg.id.clone(),
                receipt_handle: msg.receipt_handle.clone(),
            });
        }

        event::emit(&self.observers, Hook::Processed, &messages);

        self.delete_messages(queue, &entries).await?;

        event::emit(&self.observers, Hook::Deleted, &messages);

        Ok(())
    }

    /// Dispatch one message to the worker. Nothing escapes this guard:
    /// handled failures are warnings, any other error or a panic is an
    /// unhandled defect logged with context. The caller deletes the
    /// message either way — retry happens only via re-enqueue.
    async fn dispatch(&self, worker: &dyn Worker, msg: &Message) {
        debug!(message_id = %msg.id, "read message");

        if let Some(count) = msg.receive_count() {
            if count > 1 {
                // Surfaces duplicate-processing risk; informational only.
                warn!(message_id = %msg.id, count, "message redelivered by the backend");
            }
        }

        let outcome = AssertUnwindSafe(worker.execute(&msg.body))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => debug!(message_id = %msg.id, "processed message"),
            Ok(Err(Error::ExecutionFailed(e))) => {
                warn!(message_id = %msg.id, "handled execution failure: {e}");
            }
            Ok(Err(e)) => {
                error!(message_id = %msg.id, "unhandled error during dispatch: {e}");
            }
            Err(_) => {
                error!(message_id = %msg.id, "worker panicked during dispatch");
            }
        }
    }

    async fn delete_messages(&self, queue: &dyn QueueHandle, entries: &[DeleteEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let outcome = queue.delete(entries).await?;
        if !outcome.failed_ids.is_empty() {
            // Not escalated: un-deleted messages reappear after the
            // visibility timeout and task handlers must be idempotent.
            warn!(
                queue = queue.name(),
                count = outcome.failed_ids.len(),
                ids = ?outcome.failed_ids,
                "failed deleting messages"
            );
        }
        Ok(())
    }

    /// Overwrite the liveness file with the current ISO-8601 timestamp.
    fn write_heartbeat(&mut self) -> Result<()> {
        std::fs::write(&self.config.heartbeat_file, chrono::Utc::now().to_rfc3339())?;
        self.last_heartbeat = Some(Instant::now());
        Ok(())
    }
}

/// Static queues plus the freshly discovered dynamic ones,
/// deduplicated by backend identity.
fn merge_queues(
    static_queues: &[Arc<dyn QueueHandle>],
    dynamic: Vec<Arc<dyn QueueHandle>>,
) -> Vec<Arc<dyn QueueHandle>> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(static_queues.len() + dynamic.len());
    for queue in static_queues.iter().cloned().chain(dynamic) {
        if seen.insert(queue.url().to_string()) {
            merged.push(queue);
        }
    }
    merged
}
