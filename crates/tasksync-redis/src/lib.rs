//! Tasksync Redis Data Layer
//!
//! Async Redis persistence for task records plus the pub/sub primitives
//! the real-time fanout runs on.

pub mod client;
pub mod pubsub;
pub mod queries;

pub use client::{RedisError, RedisPool, RedisResult, init_client, init_pool};
pub use queries::tasks;
pub use queries::tasks::TaskRow;
