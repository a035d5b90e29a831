//! Task record queries.
//!
//! Each task is a flat hash at `tasksync:task:{id}`; the set of live ids is a
//! sorted set scored by an insertion counter, so listing follows creation
//! order even for tasks created within the same millisecond. `completed` is kept as a string in the
//! hash and only ever crosses this module as the canonical `"true"`/`"false"`.

use std::collections::HashMap;

use crate::client::{RedisError, RedisPool, RedisResult};
use redis::AsyncCommands;

const TASK_INDEX_KEY: &str = "tasksync:tasks:all";
const TASK_SEQ_KEY: &str = "tasksync:tasks:seq";

/// Writes the record and indexes it under the next insertion number.
/// ARGV[1] is the id, the rest are field/value pairs.
const INSERT_INDEXED: &str = r"
local seq = redis.call('INCR', KEYS[3])
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('ZADD', KEYS[2], seq, ARGV[1])
return seq
";

/// Only writes the fields when the record still exists, so an update that
/// races a delete cannot bring the record back.
const UPDATE_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
";

/// A task record as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub completed: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    /// Build a row, encoding `completed` for storage.
    pub fn new(id: &str, title: &str, completed: bool, created_at: &str, updated_at: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            completed: encode_completed(completed).to_string(),
            created_at: created_at.to_string(),
            updated_at: updated_at.to_string(),
        }
    }

    /// The decoded completion flag.
    pub fn is_completed(&self) -> bool {
        decode_completed(&self.completed)
    }

    fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("id", self.id.as_str()),
            ("taskTitle", self.title.as_str()),
            ("completed", encode_completed(self.is_completed())),
            ("created_at", self.created_at.as_str()),
            ("updated_at", self.updated_at.as_str()),
        ]
    }

    fn from_fields(key: &str, mut fields: HashMap<String, String>) -> RedisResult<Self> {
        let mut take = |field: &str| {
            fields.remove(field).ok_or_else(|| RedisError::Corrupt {
                key: key.to_string(),
                field: field.to_string(),
            })
        };
        Ok(Self {
            id: take("id")?,
            title: take("taskTitle")?,
            completed: take("completed")?,
            created_at: take("created_at")?,
            updated_at: take("updated_at")?,
        })
    }
}

/// Storage encoding of the completion flag.
pub fn encode_completed(completed: bool) -> &'static str {
    if completed { "true" } else { "false" }
}

/// Lenient decoding: older writers stored `1`/`True`/`yes`.
pub fn decode_completed(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn task_key(id: &str) -> String {
    format!("tasksync:task:{}", id)
}

/// Insert a task. Returns its position in the creation order.
pub async fn insert_task(pool: &RedisPool, row: &TaskRow) -> RedisResult<i64> {
    let mut conn = pool.clone();
    let script = redis::Script::new(INSERT_INDEXED);
    let mut invocation = script.prepare_invoke();
    invocation
        .key(task_key(&row.id))
        .key(TASK_INDEX_KEY)
        .key(TASK_SEQ_KEY)
        .arg(&row.id);
    for (field, value) in row.fields() {
        invocation.arg(field).arg(value);
    }
    let seq: i64 = invocation.invoke_async(&mut conn).await?;
    Ok(seq)
}

pub async fn get_task(pool: &RedisPool, task_id: &str) -> RedisResult<Option<TaskRow>> {
    let mut conn = pool.clone();
    let key = task_key(task_id);
    let fields: HashMap<String, String> = conn.hgetall(&key).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    TaskRow::from_fields(&key, fields).map(Some)
}

pub async fn list_tasks(pool: &RedisPool) -> RedisResult<Vec<TaskRow>> {
    let mut conn = pool.clone();
    let ids: Vec<String> = conn.zrange(TASK_INDEX_KEY, 0, -1).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut pipe = redis::pipe();
    for id in &ids {
        pipe.hgetall(task_key(id));
    }
    let records: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

    let mut tasks = Vec::with_capacity(records.len());
    for (id, fields) in ids.iter().zip(records) {
        // Index entry outlived its record (deleted between ZRANGE and HGETALL).
        if fields.is_empty() {
            continue;
        }
        let key = task_key(id);
        match TaskRow::from_fields(&key, fields) {
            Ok(row) => tasks.push(row),
            Err(e) => tracing::warn!(key = %key, error = %e, "Skipping corrupt task record"),
        }
    }
    Ok(tasks)
}

/// Overwrite a task's fields. Returns `false` when the task no longer exists.
pub async fn update_task(pool: &RedisPool, row: &TaskRow) -> RedisResult<bool> {
    let mut conn = pool.clone();
    let script = redis::Script::new(UPDATE_IF_EXISTS);
    let mut invocation = script.prepare_invoke();
    invocation.key(task_key(&row.id));
    for (field, value) in row.fields() {
        invocation.arg(field).arg(value);
    }
    let written: i64 = invocation.invoke_async(&mut conn).await?;
    Ok(written == 1)
}

/// Delete a task and return the record as it was, or `None` if absent.
pub async fn delete_task(pool: &RedisPool, task_id: &str) -> RedisResult<Option<TaskRow>> {
    let mut conn = pool.clone();
    let key = task_key(task_id);
    let (fields, _deleted, _unindexed): (HashMap<String, String>, i64, i64) = redis::pipe()
        .atomic()
        .hgetall(&key)
        .del(&key)
        .zrem(TASK_INDEX_KEY, task_id)
        .query_async(&mut conn)
        .await?;
    if fields.is_empty() {
        return Ok(None);
    }
    TaskRow::from_fields(&key, fields).map(Some)
}
