//! Redis connection pool management.

use redis::aio::ConnectionManager;
use thiserror::Error;

/// Redis error types.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Corrupt record {key}: missing field '{field}'")]
    Corrupt { key: String, field: String },

    #[error("Undecodable message on channel '{channel}': {reason}")]
    Payload { channel: String, reason: String },
}

/// Result type for Redis operations.
pub type RedisResult<T> = Result<T, RedisError>;

/// Redis connection pool. ConnectionManager handles multiplexing internally.
/// It is Clone, so callers clone it to get a mutable handle for each operation.
pub type RedisPool = ConnectionManager;

/// Open a Redis client without connecting.
///
/// Pub/sub needs its own dedicated connection, which is opened from the
/// client rather than from the multiplexed pool.
pub fn init_client(redis_url: &str) -> RedisResult<redis::Client> {
    Ok(redis::Client::open(redis_url)?)
}

/// Initialize a Redis connection pool from a client.
///
/// Example URL: `redis://127.0.0.1:6379`
pub async fn init_pool(client: &redis::Client) -> RedisResult<RedisPool> {
    let manager = ConnectionManager::new(client.clone()).await?;
    Ok(manager)
}
