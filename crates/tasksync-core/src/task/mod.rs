//! Task management.

pub mod model;

use crate::error::{SyncError, SyncResult};
use crate::store::TaskStore;
use model::{CreateTask, Task, UpdateTask};
use uuid::Uuid;

/// Longest accepted title, in characters.
const MAX_TITLE_LEN: usize = 500;

fn validate_title(title: &str) -> SyncResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SyncError::validation("taskTitle must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(SyncError::validation(format!(
            "taskTitle must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

/// Create a new task.
pub async fn create_task(store: &dyn TaskStore, req: CreateTask) -> SyncResult<Task> {
    let title = validate_title(&req.title)?;
    let stamp = chrono::Utc::now().to_rfc3339();
    let task = Task {
        id: Uuid::new_v4().to_string(),
        title,
        completed: req.completed.unwrap_or(false),
        created_at: stamp.clone(),
        updated_at: stamp,
    };

    store.insert(&task.to_row()).await?;
    tracing::debug!(task_id = %task.id, "Task created");
    Ok(task)
}

/// Get a task by ID.
pub async fn get_task(store: &dyn TaskStore, id: &str) -> SyncResult<Task> {
    store
        .get(id)
        .await?
        .map(Task::from_row)
        .ok_or_else(|| SyncError::TaskNotFound(id.to_string()))
}

/// List all tasks in creation order.
pub async fn list_tasks(store: &dyn TaskStore) -> SyncResult<Vec<Task>> {
    let rows = store.list().await?;
    Ok(rows.into_iter().map(Task::from_row).collect())
}

/// Apply a partial update. Only `updated_at` is refreshed.
pub async fn update_task(store: &dyn TaskStore, id: &str, req: UpdateTask) -> SyncResult<Task> {
    if req.is_empty() {
        return Err(SyncError::validation(
            "update must set at least one of taskTitle, completed",
        ));
    }
    let title = req.title.as_deref().map(validate_title).transpose()?;

    let mut task = get_task(store, id).await?;
    if let Some(title) = title {
        task.title = title;
    }
    if let Some(completed) = req.completed {
        task.completed = completed;
    }
    task.updated_at = chrono::Utc::now().to_rfc3339();

    if !store.replace(&task.to_row()).await? {
        // Deleted between the read and the write.
        return Err(SyncError::TaskNotFound(id.to_string()));
    }
    tracing::debug!(task_id = %id, completed = task.completed, "Task updated");
    Ok(task)
}

/// Delete a task, returning its last state.
pub async fn delete_task(store: &dyn TaskStore, id: &str) -> SyncResult<Task> {
    let row = store
        .remove(id)
        .await?
        .ok_or_else(|| SyncError::TaskNotFound(id.to_string()))?;
    tracing::debug!(task_id = %id, "Task deleted");
    Ok(Task::from_row(row))
}
