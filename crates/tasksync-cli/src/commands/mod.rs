//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tasksync_web::state::DEFAULT_CHANNEL;

pub mod serve;
pub mod task;

/// Tasksync - real-time shared task list
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Redis URL for task records and the update bus
    #[arg(
        long,
        global = true,
        env = "REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    pub redis_url: String,

    /// Bus channel carrying task change events
    #[arg(long, global = true, env = "TASKSYNC_CHANNEL", default_value = DEFAULT_CHANNEL)]
    pub channel: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API and push server
    Serve(serve::ServeArgs),

    /// Manage tasks directly; changes are pushed to connected clients
    #[command(subcommand)]
    Task(task::TaskCommands),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args, &self.redis_url, &self.channel).await,
            Commands::Task(cmd) => task::execute(cmd, &self.redis_url, &self.channel).await,
        }
    }
}
