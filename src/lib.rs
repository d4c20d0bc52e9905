//! # drainq
//!
//! At-least-once background task consumer for SQS-style queues.
//!
//! Polls one or more named queues (with optional prefix-based dynamic
//! discovery), dispatches each message to a process-singleton worker,
//! deletes settled messages, and re-enqueues retryable failures.
//! Duplicate delivery is possible; task handlers must be idempotent.

pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod service;
pub mod worker;
