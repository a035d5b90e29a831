//! Task management commands.
//!
//! These talk to Redis directly and publish their changes on the bus, so
//! clients connected to any running server see them.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::sync::Arc;

use tasksync_core::task::model::{ChangeAction, CreateTask, Task, UpdateTask};
use tasksync_core::{EventBus, RedisBus, RedisTaskStore};
use tasksync_web::publisher::ChangePublisher;
use tasksync_web::stats::FanoutStats;
use tasksync_web::ConnectionRegistry;

use crate::output;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a new task
    New(NewTaskArgs),

    /// List all tasks
    List,

    /// Mark a task as completed
    Done(DoneTaskArgs),

    /// Rename a task
    Rename(RenameTaskArgs),

    /// Delete a task
    Rm(TaskIdArgs),
}

#[derive(Args)]
pub struct NewTaskArgs {
    /// Task title
    pub title: String,

    /// Create the task already completed
    #[arg(long)]
    pub done: bool,
}

#[derive(Args)]
pub struct DoneTaskArgs {
    /// Task ID
    pub task_id: String,

    /// Mark as not completed instead
    #[arg(long)]
    pub undo: bool,
}

#[derive(Args)]
pub struct RenameTaskArgs {
    /// Task ID
    pub task_id: String,

    /// New title
    pub title: String,
}

#[derive(Args)]
pub struct TaskIdArgs {
    /// Task ID
    pub task_id: String,
}

pub async fn execute(cmd: TaskCommands, redis_url: &str, channel: &str) -> Result<()> {
    let client = tasksync_redis::init_client(redis_url)?;
    let pool = tasksync_redis::init_pool(&client).await?;
    let store = RedisTaskStore::new(pool.clone());
    let bus: Arc<dyn EventBus> = Arc::new(RedisBus::new(pool, client));

    // No local connections: the publisher only reaches the bus.
    let publisher = ChangePublisher::new(
        uuid::Uuid::new_v4().to_string(),
        channel,
        bus,
        Arc::new(ConnectionRegistry::new()),
        Arc::new(FanoutStats::default()),
    );

    match cmd {
        TaskCommands::New(args) => {
            let req = CreateTask {
                title: args.title,
                completed: Some(args.done),
            };
            let task = tasksync_core::task::create_task(&store, req).await?;
            announce(&publisher, ChangeAction::Create, &task).await;

            println!(
                "{} Created task: {} ({})",
                "✓".green().bold(),
                task.title.cyan(),
                task.id.dimmed()
            );
        }

        TaskCommands::List => {
            let tasks = tasksync_core::task::list_tasks(&store).await?;
            output::print_tasks(&tasks);
        }

        TaskCommands::Done(args) => {
            let req = UpdateTask {
                title: None,
                completed: Some(!args.undo),
            };
            let task = tasksync_core::task::update_task(&store, &args.task_id, req).await?;
            announce(&publisher, ChangeAction::Update, &task).await;

            let state = if task.completed { "done".green() } else { "open".yellow() };
            println!(
                "{} Marked task {} as {}",
                "✓".green().bold(),
                task.id.dimmed(),
                state
            );
        }

        TaskCommands::Rename(args) => {
            let req = UpdateTask {
                title: Some(args.title),
                completed: None,
            };
            let task = tasksync_core::task::update_task(&store, &args.task_id, req).await?;
            announce(&publisher, ChangeAction::Update, &task).await;

            println!(
                "{} Renamed task {} to {}",
                "✓".green().bold(),
                task.id.dimmed(),
                task.title.cyan()
            );
        }

        TaskCommands::Rm(args) => {
            let task = tasksync_core::task::delete_task(&store, &args.task_id).await?;
            announce(&publisher, ChangeAction::Delete, &task).await;

            println!(
                "{} Deleted task: {} ({})",
                "✓".green().bold(),
                task.title.cyan(),
                task.id.dimmed()
            );
        }
    }

    Ok(())
}

/// The write already happened; a bus failure only means live clients
/// will not hear about it.
async fn announce(publisher: &ChangePublisher, action: ChangeAction, task: &Task) {
    if let Err(e) = publisher.publish(action, task).await {
        eprintln!(
            "{} {}",
            "!".yellow().bold(),
            format!("Change saved but not broadcast: {}", e).yellow()
        );
    }
}
