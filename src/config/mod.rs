//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on unparsable values. Every knob
//! has a default so an empty environment yields a working consumer.
//!
//! In local dev, call `dotenvy::dotenv().ok()` before `from_env`.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum messages per receive call (backend caps this at 10).
    pub max_messages: u32,
    /// Long-poll wait per receive call, seconds.
    pub wait_time_s: u32,
    /// Sleep when the effective queue set is empty, seconds.
    pub no_queues_wait_time_s: u64,
    /// Marker that turns a queue name into a dynamic-discovery directive.
    pub prefix_marker: String,
    /// Minimum interval between prefix discovery queries, seconds.
    pub refresh_prefix_queues_s: u64,
    /// Namespace prepended to every queue name before backend resolution.
    pub queue_prefix: String,
    /// Queue used by `submit_task` when none is given.
    pub default_queue: String,
    /// Create missing queues on enqueue instead of failing.
    pub auto_add_queue: bool,
    /// Message retention for auto-created queues, seconds.
    pub queue_message_retention_s: u32,
    /// Visibility timeout for auto-created queues, seconds.
    pub queue_visibility_timeout_s: u32,
    /// Default enqueue delay for retries, seconds.
    pub default_delay_s: u32,
    /// Default retry budget for tasks that do not set their own.
    pub default_max_retries: u32,
    /// Whether retries consume the budget unless the directive says otherwise.
    pub default_count_retries: bool,
    /// Minimum interval between liveness file writes, seconds.
    pub min_heartbeat_period_s: u64,
    /// Liveness file age beyond which the process counts as unhealthy, seconds.
    pub heartbeat_unhealthy_s: u64,
    /// Liveness file path.
    pub heartbeat_file: String,
    /// Optional SQS endpoint override (local stacks).
    pub sqs_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from `DRAINQ_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_messages: parsed_var("DRAINQ_MAX_MESSAGES", 10)?,
            wait_time_s: parsed_var("DRAINQ_WAIT_TIME_S", 2)?,
            no_queues_wait_time_s: parsed_var("DRAINQ_NO_QUEUES_WAIT_TIME_S", 5)?,
            prefix_marker: string_var("DRAINQ_PREFIX_MARKER", "prefix:"),
            refresh_prefix_queues_s: parsed_var("DRAINQ_REFRESH_PREFIX_QUEUES_S", 10)?,
            queue_prefix: string_var("DRAINQ_QUEUE_PREFIX", ""),
            default_queue: string_var("DRAINQ_DEFAULT_QUEUE", "drainq-default"),
            auto_add_queue: parsed_var("DRAINQ_AUTO_ADD_QUEUE", false)?,
            queue_message_retention_s: parsed_var("DRAINQ_QUEUE_MESSAGE_RETENTION_S", 1_209_600)?,
            queue_visibility_timeout_s: parsed_var("DRAINQ_QUEUE_VISIBILITY_TIMEOUT_S", 300)?,
            default_delay_s: parsed_var("DRAINQ_DEFAULT_DELAY_S", 0)?,
            default_max_retries: parsed_var("DRAINQ_DEFAULT_MAX_RETRIES", 0)?,
            default_count_retries: parsed_var("DRAINQ_DEFAULT_COUNT_RETRIES", true)?,
            min_heartbeat_period_s: parsed_var("DRAINQ_MIN_HEARTBEAT_PERIOD_S", 10)?,
            heartbeat_unhealthy_s: parsed_var("DRAINQ_HEARTBEAT_UNHEALTHY_S", 300)?,
            heartbeat_file: string_var("DRAINQ_HEARTBEAT_FILE", "healthcheck.txt"),
            sqs_endpoint: std::env::var("DRAINQ_SQS_ENDPOINT").ok(),
            log_level: string_var("DRAINQ_LOG_LEVEL", "info"),
        })
    }
}

fn string_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
