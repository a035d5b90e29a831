//! Task record storage.
//!
//! `TaskStore` is the persistence seam used by the task operations. The
//! Redis implementation delegates to `tasksync_redis::tasks`; the in-memory
//! one backs tests and `serve --memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tasksync_redis::{RedisPool, TaskRow, tasks as queries};

use crate::error::SyncResult;

/// Authoritative record store for tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record at the end of the creation order.
    async fn insert(&self, row: &TaskRow) -> SyncResult<()>;

    async fn get(&self, id: &str) -> SyncResult<Option<TaskRow>>;

    /// All live records in creation order.
    async fn list(&self) -> SyncResult<Vec<TaskRow>>;

    /// Overwrite an existing record. Returns `false` if it no longer exists.
    async fn replace(&self, row: &TaskRow) -> SyncResult<bool>;

    /// Remove a record, returning it as it was before removal.
    async fn remove(&self, id: &str) -> SyncResult<Option<TaskRow>>;
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisTaskStore {
    pool: RedisPool,
}

impl RedisTaskStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn insert(&self, row: &TaskRow) -> SyncResult<()> {
        queries::insert_task(&self.pool, row).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> SyncResult<Option<TaskRow>> {
        Ok(queries::get_task(&self.pool, id).await?)
    }

    async fn list(&self) -> SyncResult<Vec<TaskRow>> {
        Ok(queries::list_tasks(&self.pool).await?)
    }

    async fn replace(&self, row: &TaskRow) -> SyncResult<bool> {
        Ok(queries::update_task(&self.pool, row).await?)
    }

    async fn remove(&self, id: &str) -> SyncResult<Option<TaskRow>> {
        Ok(queries::delete_task(&self.pool, id).await?)
    }
}

#[derive(Default)]
struct MemoryTables {
    rows: HashMap<String, (i64, TaskRow)>,
}

/// Process-local store with the same semantics as the Redis one.
#[derive(Default)]
pub struct MemoryTaskStore {
    tables: RwLock<MemoryTables>,
    seq: AtomicI64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw row at an explicit position, bypassing the task
    /// operations. Used to seed records in a legacy encoding.
    pub fn put_raw(&self, row: TaskRow, position: i64) {
        self.tables.write().rows.insert(row.id.clone(), (position, row));
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, row: &TaskRow) -> SyncResult<()> {
        let position = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.put_raw(row.clone(), position);
        Ok(())
    }

    async fn get(&self, id: &str) -> SyncResult<Option<TaskRow>> {
        Ok(self.tables.read().rows.get(id).map(|(_, row)| row.clone()))
    }

    async fn list(&self) -> SyncResult<Vec<TaskRow>> {
        let tables = self.tables.read();
        let mut rows: Vec<&(i64, TaskRow)> = tables.rows.values().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(rows.into_iter().map(|(_, row)| row.clone()).collect())
    }

    async fn replace(&self, row: &TaskRow) -> SyncResult<bool> {
        let mut tables = self.tables.write();
        match tables.rows.get_mut(&row.id) {
            Some(entry) => {
                entry.1 = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> SyncResult<Option<TaskRow>> {
        Ok(self.tables.write().rows.remove(id).map(|(_, row)| row))
    }
}
