//! Shared test doubles: an in-memory queue backend with scriptable
//! receive results, plus a recording worker.

#![allow(dead_code)]

use async_trait::async_trait;
use drainq::config::Config;
use drainq::error::{Error, Result};
use drainq::queue::{
    DeleteEntry, DeleteOutcome, Message, QueueClient, QueueHandle, RECEIVE_COUNT_ATTRIBUTE,
};
use drainq::worker::{Worker, WorkerFactory};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One scripted receive result.
pub enum Poll {
    Batch(Vec<Message>),
    NotFound,
    Fault,
}

/// In-memory queue. Each `receive` pops the next scripted result;
/// an exhausted script yields empty batches.
pub struct FakeQueue {
    url: String,
    name: String,
    script: Mutex<VecDeque<Poll>>,
    pub receive_calls: AtomicUsize,
    pub deleted: Mutex<Vec<Vec<DeleteEntry>>>,
}

impl FakeQueue {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            url: format!("mem://{name}"),
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            receive_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, poll: Poll) {
        self.script.lock().unwrap().push_back(poll);
    }

    /// Total delete entries submitted across all batches.
    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl QueueHandle for FakeQueue {
    fn url(&self) -> &str {
        &self.url
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, _max_messages: u32, _wait_time_s: u32) -> Result<Vec<Message>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Poll::Batch(messages)) => Ok(messages),
            Some(Poll::NotFound) => Err(Error::QueueDoesNotExist(self.name.clone())),
            Some(Poll::Fault) => Err(Error::Backend("scripted backend fault".to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, entries: &[DeleteEntry]) -> Result<DeleteOutcome> {
        self.deleted.lock().unwrap().push(entries.to_vec());
        Ok(DeleteOutcome::default())
    }
}

/// What was passed to `add_message`.
pub struct SentMessage {
    pub queue: String,
    pub body: String,
    pub delay_s: u32,
}

/// In-memory queue client: resolves registered [`FakeQueue`]s and
/// records enqueues and prefix queries.
#[derive(Default)]
pub struct FakeClient {
    queues: Mutex<Vec<Arc<FakeQueue>>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub prefix_queries: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_queue(&self, queue: Arc<FakeQueue>) {
        self.queues.lock().unwrap().push(queue);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueClient for FakeClient {
    async fn add_message(&self, queue_name: &str, body: &str, delay_s: u32) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            queue: queue_name.to_string(),
            body: body.to_string(),
            delay_s,
        });
        Ok(())
    }

    async fn get_queues_by_names(&self, names: &[String]) -> Result<Vec<Arc<dyn QueueHandle>>> {
        let queues = self.queues.lock().unwrap();
        let mut resolved: Vec<Arc<dyn QueueHandle>> = Vec::with_capacity(names.len());
        for name in names {
            let queue = queues
                .iter()
                .find(|q| q.name == *name)
                .ok_or_else(|| Error::QueueDoesNotExist(name.clone()))?;
            resolved.push(Arc::clone(queue) as Arc<dyn QueueHandle>);
        }
        Ok(resolved)
    }

    async fn get_queues_by_prefixes(
        &self,
        prefixes: &[String],
    ) -> Result<Vec<Arc<dyn QueueHandle>>> {
        self.prefix_queries.fetch_add(1, Ordering::SeqCst);
        let queues = self.queues.lock().unwrap();
        Ok(queues
            .iter()
            .filter(|q| prefixes.iter().any(|p| q.name.starts_with(p.as_str())))
            .map(|q| Arc::clone(q) as Arc<dyn QueueHandle>)
            .collect())
    }
}

/// Records every executed body; settles by body prefix: `fail*` is a
/// handled failure, `boom*` an unhandled defect, `panic*` panics,
/// anything else succeeds.
#[derive(Default)]
pub struct RecordingWorker {
    pub executed: Mutex<Vec<String>>,
}

#[async_trait]
impl Worker for RecordingWorker {
    async fn execute(&self, body: &str) -> Result<()> {
        self.executed.lock().unwrap().push(body.to_string());
        if body.starts_with("fail") {
            Err(Error::ExecutionFailed("scripted failure".to_string()))
        } else if body.starts_with("boom") {
            Err(Error::Backend("scripted defect".to_string()))
        } else if body.starts_with("panic") {
            panic!("scripted handler bug");
        } else {
            Ok(())
        }
    }
}

impl RecordingWorker {
    pub fn executed_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

/// Factory that hands out one pre-built worker.
pub struct FixedFactory(pub Arc<dyn Worker>);

impl WorkerFactory for FixedFactory {
    fn create(&self) -> Result<Arc<dyn Worker>> {
        Ok(Arc::clone(&self.0))
    }
}

pub fn message(id: &str, body: &str) -> Message {
    Message {
        id: id.to_string(),
        body: body.to_string(),
        receipt_handle: format!("rh-{id}"),
        attributes: HashMap::new(),
    }
}

pub fn redelivered_message(id: &str, body: &str, receive_count: u32) -> Message {
    let mut msg = message(id, body);
    msg.attributes
        .insert(RECEIVE_COUNT_ATTRIBUTE.to_string(), receive_count.to_string());
    msg
}

pub fn test_config() -> Config {
    Config {
        max_messages: 10,
        wait_time_s: 0,
        no_queues_wait_time_s: 0,
        prefix_marker: "prefix:".to_string(),
        refresh_prefix_queues_s: 3600,
        queue_prefix: String::new(),
        default_queue: "default".to_string(),
        auto_add_queue: false,
        queue_message_retention_s: 1_209_600,
        queue_visibility_timeout_s: 300,
        default_delay_s: 0,
        default_max_retries: 0,
        default_count_retries: true,
        min_heartbeat_period_s: 3600,
        heartbeat_unhealthy_s: 300,
        heartbeat_file: "healthcheck.txt".to_string(),
        sqs_endpoint: None,
        log_level: "info".to_string(),
    }
}
