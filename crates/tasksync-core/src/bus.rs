//! Shared pub/sub bus that carries change events between server instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tasksync_redis::{RedisError, RedisPool, pubsub};
use thiserror::Error;
use tokio::sync::broadcast;

/// Bus error types.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Redis pub/sub error: {0}")]
    Redis(#[from] RedisError),

    #[error("Subscriber lagged behind, {0} messages skipped")]
    Lagged(u64),

    #[error("Bus closed")]
    Closed,

    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// One message could not be decoded. The subscription is still live.
    #[error("Undecodable message: {0}")]
    Decode(String),
}

impl BusError {
    /// Whether the subscription that produced this error is still usable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Lazy, infinite message sequence for one subscription.
pub type MessageStream = BoxStream<'static, Result<String, BusError>>;

/// Publish/subscribe capability consumed by the fanout.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError>;
}

/// Bus backed by Redis PUBLISH/SUBSCRIBE.
#[derive(Clone)]
pub struct RedisBus {
    pool: RedisPool,
    client: redis::Client,
}

impl RedisBus {
    pub fn new(pool: RedisPool, client: redis::Client) -> Self {
        Self { pool, client }
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let receivers = pubsub::publish(&self.pool, channel, payload).await?;
        tracing::trace!(channel, receivers, "Published to Redis channel");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let messages = pubsub::subscribe(&self.client, channel).await?;
        Ok(messages
            .map(|item| {
                item.map_err(|e| match e {
                    RedisError::Payload { .. } => BusError::Decode(e.to_string()),
                    other => BusError::Redis(other),
                })
            })
            .boxed())
    }
}

const MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// In-process bus. Several server instances built on clones of the same
/// `Arc<MemoryBus>` see each other's events, which is how multi-instance
/// behaviour is exercised without a Redis server.
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    reject_publishes: AtomicBool,
    severed: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            reject_publishes: AtomicBool::new(false),
            severed: AtomicBool::new(false),
        }
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn reject_publishes(&self, reject: bool) {
        self.reject_publishes.store(reject, Ordering::SeqCst);
    }

    /// Drop every channel. Open subscriptions end and all later
    /// operations fail with `BusError::Closed`.
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        self.channels.lock().clear();
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if self.reject_publishes.load(Ordering::SeqCst) {
            return Err(BusError::Rejected(format!("channel '{channel}' unavailable")));
        }
        // No subscribers is not an error, same as Redis.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let rx = self.sender(channel).subscribe();
        let messages = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(payload) => Some((Ok(payload), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    Some((Err(BusError::Lagged(skipped)), rx))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(messages.boxed())
    }
}
