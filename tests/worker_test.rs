//! Integration tests for the default execution layer: registry
//! dispatch, retry directive semantics, and factory memoization.

mod common;

use async_trait::async_trait;
use common::*;
use drainq::error::Error;
use drainq::worker::tasks::{TaskEnvelope, TaskError, TaskHandler, TaskRegistry, submit_task};
use drainq::worker::{Retry, TaskWorker, TaskWorkerFactory, Worker, WorkerFactory};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Succeeds;

#[async_trait]
impl TaskHandler for Succeeds {
    async fn run(&self, _args: &Value) -> Result<(), TaskError> {
        Ok(())
    }
}

struct Fails;

#[async_trait]
impl TaskHandler for Fails {
    async fn run(&self, _args: &Value) -> Result<(), TaskError> {
        Err(TaskError::Failed("no can do".to_string()))
    }
}

struct RetriesWith(Retry);

#[async_trait]
impl TaskHandler for RetriesWith {
    async fn run(&self, _args: &Value) -> Result<(), TaskError> {
        Err(TaskError::Retry(self.0.clone()))
    }
}

fn worker_with(name: &str, handler: Arc<dyn TaskHandler>) -> (Arc<FakeClient>, TaskWorker) {
    let client = Arc::new(FakeClient::new());
    let mut registry = TaskRegistry::new();
    registry.register(name, handler);
    let worker = TaskWorker::new(client.clone(), Arc::new(registry), &test_config());
    (client, worker)
}

fn envelope(name: &str, retry: u32, max_retries: u32) -> String {
    let envelope = TaskEnvelope {
        id: Uuid::new_v4(),
        name: name.to_string(),
        args: json!({}),
        queue: "jobs".to_string(),
        retry,
        max_retries,
    };
    serde_json::to_string(&envelope).unwrap()
}

fn sent_envelope(client: &FakeClient) -> TaskEnvelope {
    let sent = client.sent.lock().unwrap();
    assert_eq!(sent.len(), 1, "expected exactly one re-enqueue");
    serde_json::from_str(&sent[0].body).unwrap()
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registered_task_executes_successfully() {
    let (client, worker) = worker_with("noop", Arc::new(Succeeds));
    worker.execute(&envelope("noop", 0, 0)).await.unwrap();
    assert_eq!(client.sent_count(), 0);
}

#[tokio::test]
async fn unknown_task_settles_as_handled_failure() {
    let (_, worker) = worker_with("noop", Arc::new(Succeeds));
    let err = worker.execute(&envelope("other", 0, 0)).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
}

#[tokio::test]
async fn malformed_body_settles_as_handled_failure() {
    let (_, worker) = worker_with("noop", Arc::new(Succeeds));
    let err = worker.execute("not json at all").await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
}

#[tokio::test]
async fn terminal_task_failure_settles_as_handled_failure() {
    let (client, worker) = worker_with("doomed", Arc::new(Fails));
    let err = worker.execute(&envelope("doomed", 0, 3)).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
    assert_eq!(client.sent_count(), 0);
}

// ---------------------------------------------------------------------------
// Retry directive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_with_delay_and_no_counting_reenqueues_without_spending_budget() {
    let directive = Retry::new()
        .delay(Duration::from_secs(30))
        .count_retries(false);
    let (client, worker) = worker_with("flaky", Arc::new(RetriesWith(directive)));

    // Budget already spent; a non-counting retry still goes through.
    worker.execute(&envelope("flaky", 2, 2)).await.unwrap();

    let resent = sent_envelope(&client);
    assert_eq!(client.sent.lock().unwrap()[0].delay_s, 30);
    assert_eq!(resent.retry, 2);
    assert_eq!(resent.queue, "jobs");
}

#[tokio::test]
async fn counting_retry_increments_attempts_and_stops_at_the_budget() {
    let (client, worker) = worker_with("flaky", Arc::new(RetriesWith(Retry::new())));

    worker.execute(&envelope("flaky", 0, 2)).await.unwrap();
    assert_eq!(sent_envelope(&client).retry, 1);

    let err = worker.execute(&envelope("flaky", 2, 2)).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)));
    // Budget exhaustion produces no further enqueue.
    assert_eq!(client.sent_count(), 1);
}

#[tokio::test]
async fn max_retries_resolver_overrides_the_envelope_budget() {
    let directive = Retry::new().max_retries(|args| args["limit"].as_u64().unwrap_or(0) as u32);
    let (client, worker) = worker_with("flaky", Arc::new(RetriesWith(directive)));

    let envelope = TaskEnvelope {
        id: Uuid::new_v4(),
        name: "flaky".to_string(),
        args: json!({"limit": 5}),
        queue: "jobs".to_string(),
        retry: 4,
        max_retries: 2,
    };
    let body = serde_json::to_string(&envelope).unwrap();

    // Envelope budget (2) is already exceeded, but the resolver says 5.
    worker.execute(&body).await.unwrap();
    assert_eq!(sent_envelope(&client).retry, 5);
}

// ---------------------------------------------------------------------------
// Submission and factory
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_task_enqueues_a_fresh_envelope() {
    let client = FakeClient::new();
    let mut config = test_config();
    config.default_max_retries = 4;

    let id = submit_task(&client, &config, "jobs", "noop", json!({"n": 1}), 7)
        .await
        .unwrap();

    let sent = client.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].queue, "jobs");
    assert_eq!(sent[0].delay_s, 7);
    let envelope: TaskEnvelope = serde_json::from_str(&sent[0].body).unwrap();
    assert_eq!(envelope.id, id);
    assert_eq!(envelope.name, "noop");
    assert_eq!(envelope.retry, 0);
    assert_eq!(envelope.max_retries, 4);
}

#[tokio::test]
async fn factory_memoizes_a_single_worker() {
    let client = Arc::new(FakeClient::new());
    let registry = Arc::new(TaskRegistry::new());
    let factory = TaskWorkerFactory::new(client, registry, &test_config());

    let first = factory.create().unwrap();
    let second = factory.create().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
