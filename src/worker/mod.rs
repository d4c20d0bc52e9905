//! Worker construction and the execution seam.
//!
//! The service dispatches raw message bodies to one [`Worker`] per
//! process. [`WorkerFactory`] owns the singleton discipline: `create`
//! memoizes the first construction and returns the same instance
//! thereafter, so connection-bearing resources inside the worker are
//! built once and shared rather than per message. Construction happens
//! before the dispatch loop starts; the `OnceCell` guard keeps the
//! memoization sound even if a caller parallelizes later.

pub mod retry;
pub mod tasks;

pub use retry::Retry;
pub use tasks::{TaskError, TaskHandler, TaskRegistry, TaskWorker};

use crate::config::Config;
use crate::error::Result;
use crate::queue::QueueClient;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Executes one serialized task body and settles the outcome.
///
/// An `Err(Error::ExecutionFailed(_))` is a failure the execution layer
/// has already recognized; the service logs it and still deletes the
/// message. Any other error is an unhandled defect, caught and logged
/// at the service's outer guard.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn execute(&self, body: &str) -> Result<()>;
}

/// Constructs the process-wide worker.
pub trait WorkerFactory: Send + Sync {
    /// First call constructs the worker; every later call returns the
    /// same instance.
    fn create(&self) -> Result<Arc<dyn Worker>>;
}

/// Built-in factory producing a [`TaskWorker`] over the given queue
/// client and task registry.
pub struct TaskWorkerFactory {
    client: Arc<dyn QueueClient>,
    registry: Arc<TaskRegistry>,
    config: Config,
    worker: OnceCell<Arc<dyn Worker>>,
}

impl TaskWorkerFactory {
    pub fn new(client: Arc<dyn QueueClient>, registry: Arc<TaskRegistry>, config: &Config) -> Self {
        Self {
            client,
            registry,
            config: config.clone(),
            worker: OnceCell::new(),
        }
    }
}

impl WorkerFactory for TaskWorkerFactory {
    fn create(&self) -> Result<Arc<dyn Worker>> {
        let worker = self.worker.get_or_init(|| {
            Arc::new(TaskWorker::new(
                Arc::clone(&self.client),
                Arc::clone(&self.registry),
                &self.config,
            )) as Arc<dyn Worker>
        });
        Ok(Arc::clone(worker))
    }
}
