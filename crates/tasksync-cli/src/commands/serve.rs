//! Web server command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tasksync_core::{EventBus, MemoryBus, MemoryTaskStore, RedisBus, RedisTaskStore, TaskStore};
use tasksync_web::{AppState, RealtimeConfig};

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "TASKSYNC_PORT", default_value = "8000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "TASKSYNC_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Seconds of silence before a connection is sent a liveness probe
    #[arg(long, env = "TASKSYNC_IDLE_TIMEOUT_SECS", default_value = "30")]
    pub idle_timeout_secs: u64,

    /// Messages queued per connection before it is dropped as too slow
    #[arg(long, env = "TASKSYNC_OUTBOUND_BUFFER", default_value = "256")]
    pub outbound_buffer: usize,

    /// Keep tasks and events in process memory instead of Redis
    #[arg(long, env = "TASKSYNC_MEMORY")]
    pub memory: bool,

    /// Also write logs to a file
    #[arg(long, env = "TASKSYNC_LOG")]
    pub log: bool,

    /// Log file path (defaults to ./tasksync.log)
    #[arg(long, env = "TASKSYNC_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, redis_url: &str, channel: &str) -> Result<()> {
    let config = RealtimeConfig {
        channel: channel.to_string(),
        idle_timeout: Duration::from_secs(args.idle_timeout_secs.max(1)),
        outbound_buffer: args.outbound_buffer.max(1),
    };

    let (store, bus): (Arc<dyn TaskStore>, Arc<dyn EventBus>) = if args.memory {
        tracing::warn!("Running with in-memory storage; other instances will not see these tasks");
        (Arc::new(MemoryTaskStore::new()), Arc::new(MemoryBus::new()))
    } else {
        let client = tasksync_redis::init_client(redis_url)
            .with_context(|| format!("Invalid Redis URL: {}", redis_url))?;
        let pool = tasksync_redis::init_pool(&client)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", redis_url))?;
        (
            Arc::new(RedisTaskStore::new(pool.clone())),
            Arc::new(RedisBus::new(pool, client)),
        )
    };

    let state = AppState::new(store, bus, config);
    print_banner(&args, state.origin(), channel);

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    tasksync_web::run_server(state, &args.host, args.port).await?;

    Ok(())
}

fn print_banner(args: &ServeArgs, origin: &str, channel: &str) {
    println!();
    println!("  {} {}", "Tasksync".cyan().bold(), "Server".bold());
    println!();
    println!("  {}        http://{}:{}/tasks", "API".green(), args.host, args.port);
    println!("  {}  ws://{}:{}/ws", "WebSocket".green(), args.host, args.port);
    println!("  {}     http://{}:{}/health", "Health".green(), args.host, args.port);
    println!();
    println!("  {}    {}", "Channel".green(), channel);
    println!("  {}     {}", "Origin".green(), origin.dimmed());
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();
}
