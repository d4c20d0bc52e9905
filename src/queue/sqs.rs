//! AWS SQS implementation of the queue capability traits.
//!
//! Queue identity is the SQS queue URL. Names are namespaced with the
//! configured queue prefix before resolution, so one AWS account can
//! host several isolated deployments.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::{DeleteEntry, DeleteOutcome, Message, QueueClient, QueueHandle};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::{
    DeleteMessageBatchRequestEntry, MessageSystemAttributeName, QueueAttributeName,
};
use std::sync::Arc;

/// One resolved SQS queue.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    url: String,
    name: String,
}

impl SqsQueue {
    fn new(client: Client, url: String) -> Self {
        let name = url.rsplit('/').next().unwrap_or(&url).to_string();
        Self { client, url, name }
    }
}

#[async_trait]
impl QueueHandle for SqsQueue {
    fn url(&self) -> &str {
        &self.url
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max_messages: u32, wait_time_s: u32) -> Result<Vec<Message>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait_time_s as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| {
                if is_service_error(&e, |se| se.is_queue_does_not_exist()) {
                    Error::QueueDoesNotExist(self.name.clone())
                } else {
                    Error::Backend(format!("receive from {}: {}", self.name, e))
                }
            })?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|msg| Message {
                id: msg.message_id.unwrap_or_default(),
                body: msg.body.unwrap_or_default(),
                receipt_handle: msg.receipt_handle.unwrap_or_default(),
                attributes: msg
                    .attributes
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k.as_str().to_string(), v))
                    .collect(),
            })
            .collect();

        Ok(messages)
    }

    async fn delete(&self, entries: &[DeleteEntry]) -> Result<DeleteOutcome> {
        let mut batch = Vec::with_capacity(entries.len());
        for entry in entries {
            batch.push(
                DeleteMessageBatchRequestEntry::builder()
                    .id(&entry.id)
                    .receipt_handle(&entry.receipt_handle)
                    .build()
                    .map_err(|e| Error::Backend(format!("delete entry for {}: {}", entry.id, e)))?,
            );
        }

        let output = self
            .client
            .delete_message_batch()
            .queue_url(&self.url)
            .set_entries(Some(batch))
            .send()
            .await
            .map_err(|e| {
                if is_service_error(&e, |se| se.is_queue_does_not_exist()) {
                    Error::QueueDoesNotExist(self.name.clone())
                } else {
                    Error::Backend(format!("delete from {}: {}", self.name, e))
                }
            })?;

        let failed_ids = output
            .failed()
            .iter()
            .map(|entry| entry.id().to_string())
            .collect();

        Ok(DeleteOutcome { failed_ids })
    }
}

/// SQS-backed [`QueueClient`].
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: Client,
    queue_prefix: String,
    auto_add_queue: bool,
    message_retention_s: u32,
    visibility_timeout_s: u32,
}

impl SqsQueueClient {
    /// Build from a loaded AWS SDK config, honoring the optional
    /// endpoint override for local stacks.
    pub fn new(sdk_config: &SdkConfig, config: &Config) -> Self {
        let mut builder = aws_sdk_sqs::config::Builder::from(sdk_config);
        if let Some(endpoint) = &config.sqs_endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: Client::from_conf(builder.build()),
            queue_prefix: config.queue_prefix.clone(),
            auto_add_queue: config.auto_add_queue,
            message_retention_s: config.queue_message_retention_s,
            visibility_timeout_s: config.queue_visibility_timeout_s,
        }
    }

    fn namespaced(&self, queue_name: &str) -> String {
        format!("{}{}", self.queue_prefix, queue_name)
    }

    async fn queue_url(&self, full_name: &str) -> Result<String> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(full_name)
            .send()
            .await
            .map_err(|e| {
                if is_service_error(&e, |se| se.is_queue_does_not_exist()) {
                    Error::QueueDoesNotExist(full_name.to_string())
                } else {
                    Error::Backend(format!("resolve queue {full_name}: {e}"))
                }
            })?;

        output
            .queue_url
            .ok_or_else(|| Error::Backend(format!("no url returned for queue {full_name}")))
    }

    async fn create_queue(&self, full_name: &str) -> Result<String> {
        tracing::info!(queue = full_name, "creating queue");
        let output = self
            .client
            .create_queue()
            .queue_name(full_name)
            .attributes(
                QueueAttributeName::MessageRetentionPeriod,
                self.message_retention_s.to_string(),
            )
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                self.visibility_timeout_s.to_string(),
            )
            .send()
            .await
            .map_err(|e| Error::Backend(format!("create queue {full_name}: {e}")))?;

        output
            .queue_url
            .ok_or_else(|| Error::Backend(format!("no url returned for queue {full_name}")))
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn add_message(&self, queue_name: &str, body: &str, delay_s: u32) -> Result<()> {
        let full_name = self.namespaced(queue_name);
        let url = match self.queue_url(&full_name).await {
            Ok(url) => url,
            Err(Error::QueueDoesNotExist(_)) if self.auto_add_queue => {
                self.create_queue(&full_name).await?
            }
            Err(e) => return Err(e),
        };

        self.client
            .send_message()
            .queue_url(&url)
            .message_body(body)
            .delay_seconds(delay_s as i32)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("send to {full_name}: {e}")))?;

        Ok(())
    }

    async fn get_queues_by_names(&self, names: &[String]) -> Result<Vec<Arc<dyn QueueHandle>>> {
        let mut queues: Vec<Arc<dyn QueueHandle>> = Vec::with_capacity(names.len());
        for name in names {
            let url = self.queue_url(&self.namespaced(name)).await?;
            queues.push(Arc::new(SqsQueue::new(self.client.clone(), url)));
        }
        Ok(queues)
    }

    async fn get_queues_by_prefixes(
        &self,
        prefixes: &[String],
    ) -> Result<Vec<Arc<dyn QueueHandle>>> {
        let mut queues: Vec<Arc<dyn QueueHandle>> = Vec::new();
        for prefix in prefixes {
            let full_prefix = self.namespaced(prefix);
            let mut pages = self
                .client
                .list_queues()
                .queue_name_prefix(&full_prefix)
                .into_paginator()
                .items()
                .send();
            while let Some(url) = pages.next().await {
                let url =
                    url.map_err(|e| Error::Backend(format!("list queues {full_prefix}: {e}")))?;
                queues.push(Arc::new(SqsQueue::new(self.client.clone(), url)));
            }
        }
        Ok(queues)
    }
}

/// True when the SDK error wraps a modeled service error matching `pred`.
fn is_service_error<E, R>(
    err: &aws_sdk_sqs::error::SdkError<E, R>,
    pred: impl FnOnce(&E) -> bool,
) -> bool {
    err.as_service_error().is_some_and(pred)
}
