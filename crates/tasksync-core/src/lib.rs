//! Tasksync Core Library
//!
//! Task domain model, change events, and the storage and bus seams the
//! real-time fanout is built on.

pub mod bus;
pub mod error;
pub mod store;
pub mod task;

pub use bus::{BusError, EventBus, MemoryBus, MessageStream, RedisBus};
pub use error::{SyncError, SyncResult};
pub use store::{MemoryTaskStore, RedisTaskStore, TaskStore};
