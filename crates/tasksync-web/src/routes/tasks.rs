//! Task route handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tasksync_core::task::model::{ChangeAction, CreateTask, Task, UpdateTask};
use tasksync_core::SyncError;
use tracing::error;

use crate::state::AppState;

/// Map a task error onto an HTTP status and message.
fn api_error(e: SyncError) -> (StatusCode, String) {
    let status = match &e {
        SyncError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        SyncError::ValidationError(_) => StatusCode::BAD_REQUEST,
        SyncError::Storage(_) | SyncError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if !e.is_client_error() {
        error!(error = %e, "Task operation failed");
    }
    (status, e.to_string())
}

pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let tasks = tasksync_core::task::list_tasks(state.store.as_ref())
        .await
        .map_err(api_error)?;

    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let task = tasksync_core::task::get_task(state.store.as_ref(), &id)
        .await
        .map_err(api_error)?;

    Ok(Json(task))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    let task = tasksync_core::task::create_task(state.store.as_ref(), req)
        .await
        .map_err(api_error)?;

    state.notify(ChangeAction::Create, &task).await;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTask>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let task = tasksync_core::task::update_task(state.store.as_ref(), &id, req)
        .await
        .map_err(api_error)?;

    state.notify(ChangeAction::Update, &task).await;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let task = tasksync_core::task::delete_task(state.store.as_ref(), &id)
        .await
        .map_err(api_error)?;

    state.notify(ChangeAction::Delete, &task).await;

    Ok(Json(task))
}
