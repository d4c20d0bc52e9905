//! drainq CLI — run the consumer, submit tasks, check liveness.
//!
//! The shipped `serve` command runs with an empty task registry;
//! embedders build their own binary that registers handlers on a
//! [`TaskRegistry`] before constructing the factory.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use drainq::config::Config;
use drainq::queue::sqs::SqsQueueClient;
use drainq::service::{ServiceConfig, WorkerService};
use drainq::worker::tasks::{TaskRegistry, submit_task};
use drainq::worker::TaskWorkerFactory;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drainq", about = "At-least-once SQS task consumer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling/dispatch loop until SIGTERM or Ctrl-C
    Serve {
        /// Queue names to process, separated by commas; entries
        /// starting with the prefix marker (default "prefix:") enable
        /// dynamic discovery
        #[arg(long, short)]
        queues: String,
    },
    /// Submit one task envelope
    Submit {
        /// Task name (determines handler routing on the consumer)
        name: String,
        /// Target queue; defaults to the configured default queue
        #[arg(long)]
        queue: Option<String>,
        /// JSON arguments
        #[arg(long)]
        args: Option<String>,
        /// Delivery delay in seconds
        #[arg(long, default_value_t = 0)]
        delay: u32,
    },
    /// Exit nonzero when the liveness file is missing or stale
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Command::Serve { queues } => cmd_serve(config, queues).await,
        Command::Submit {
            name,
            queue,
            args,
            delay,
        } => cmd_submit(config, name, queue, args, delay).await,
        Command::Health => cmd_health(config),
    }
}

async fn sqs_client(config: &Config) -> SqsQueueClient {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    SqsQueueClient::new(&sdk_config, config)
}

async fn cmd_serve(config: Config, queues: String) -> anyhow::Result<()> {
    let queue_names: Vec<String> = queues
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if queue_names.is_empty() {
        bail!("no queue names given (--queues)");
    }

    let client = Arc::new(sqs_client(&config).await);
    let registry = Arc::new(TaskRegistry::new());
    let factory = Arc::new(TaskWorkerFactory::new(
        client.clone(),
        registry,
        &config,
    ));

    let mut service = WorkerService::new(client, factory, ServiceConfig::from(&config));

    let flag = service.shutdown_flag();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received");
        flag.store(true, Ordering::Relaxed);
    });

    service.process_queues(&queue_names).await?;
    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn cmd_submit(
    config: Config,
    name: String,
    queue: Option<String>,
    args: Option<String>,
    delay: u32,
) -> anyhow::Result<()> {
    let args = match args {
        Some(json) => serde_json::from_str(&json).context("parsing --args")?,
        None => serde_json::json!({}),
    };
    let queue = queue.unwrap_or_else(|| config.default_queue.clone());

    let client = sqs_client(&config).await;
    let id = submit_task(&client, &config, &queue, &name, args, delay).await?;
    println!("submitted task {id} to {queue}");
    Ok(())
}

fn cmd_health(config: Config) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&config.heartbeat_file)
        .with_context(|| format!("reading liveness file {}", config.heartbeat_file))?;
    let written = chrono::DateTime::parse_from_rfc3339(raw.trim())
        .context("parsing liveness timestamp")?;

    let age = chrono::Utc::now().signed_duration_since(written);
    let limit = chrono::Duration::seconds(config.heartbeat_unhealthy_s as i64);
    if age > limit {
        bail!(
            "unhealthy: liveness file is {}s old (limit {}s)",
            age.num_seconds(),
            limit.num_seconds()
        );
    }

    println!("healthy: liveness file is {}s old", age.num_seconds());
    Ok(())
}
