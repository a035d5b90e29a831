//! Task domain models and change events.

use serde::{Deserialize, Deserializer, Serialize};
use tasksync_redis::TaskRow;

/// A shared task record as presented at the API and push boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "taskTitle")]
    pub title: String,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Create a Task from a stored row, decoding `completed`.
    pub fn from_row(row: TaskRow) -> Self {
        let completed = row.is_completed();
        Self {
            id: row.id,
            title: row.title,
            completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Convert back into the storage representation.
    pub fn to_row(&self) -> TaskRow {
        TaskRow::new(
            &self.id,
            &self.title,
            self.completed,
            &self.created_at,
            &self.updated_at,
        )
    }
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    #[serde(rename = "taskTitle")]
    pub title: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub completed: Option<bool>,
}

/// Body of `PUT /tasks/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    #[serde(rename = "taskTitle", default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub completed: Option<bool>,
}

impl UpdateTask {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completed.is_none()
    }
}

/// Accepts `true`, `"true"`, `"True"`, `"1"` and the like.
fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Bool(b)) => Ok(Some(b)),
        Some(Raw::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean for 'completed': {other:?}"
            ))),
        },
    }
}

/// Kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A task mutation as carried on the bus and pushed to clients.
///
/// `origin` identifies the publishing process and `seq` counts that
/// process's events, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub task: Task,
    pub origin: String,
    pub seq: u64,
}

impl ChangeEvent {
    pub fn new(action: ChangeAction, task: Task, origin: impl Into<String>, seq: u64) -> Self {
        Self {
            action,
            task,
            origin: origin.into(),
            seq,
        }
    }
}
