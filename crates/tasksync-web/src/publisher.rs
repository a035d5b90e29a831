//! Change publisher: turns a completed mutation into a change event on the
//! shared bus and on this process's own connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tasksync_core::task::model::{ChangeAction, ChangeEvent, Task};
use tasksync_core::{BusError, EventBus};
use thiserror::Error;
use tracing::debug;

use crate::registry::ConnectionRegistry;
use crate::stats::FanoutStats;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to encode change event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bus rejected the event. Local connections were still notified.
    #[error("transport degraded: {0}")]
    TransportDegraded(#[from] BusError),
}

pub struct ChangePublisher {
    origin: String,
    channel: String,
    seq: AtomicU64,
    bus: Arc<dyn EventBus>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<FanoutStats>,
}

impl ChangePublisher {
    pub fn new(
        origin: impl Into<String>,
        channel: impl Into<String>,
        bus: Arc<dyn EventBus>,
        registry: Arc<ConnectionRegistry>,
        stats: Arc<FanoutStats>,
    ) -> Self {
        Self {
            origin: origin.into(),
            channel: channel.into(),
            seq: AtomicU64::new(0),
            bus,
            registry,
            stats,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Publish a change and push it to local connections.
    ///
    /// Returns the event's sequence number. Local connections are served
    /// before the bus is touched, so a stalled or failing bus never delays
    /// them; the relay on this process skips events carrying our own
    /// origin, so local clients see each event once.
    pub async fn publish(&self, action: ChangeAction, task: &Task) -> Result<u64, PublishError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent::new(action, task.clone(), self.origin.as_str(), seq);
        let payload = serde_json::to_string(&event)?;

        self.registry.broadcast_all(&payload);

        match self.bus.publish(&self.channel, &payload).await {
            Ok(()) => {
                FanoutStats::incr(&self.stats.published);
                debug!(action = action.as_str(), task_id = %task.id, seq, "Change event published");
                Ok(seq)
            }
            Err(e) => {
                FanoutStats::incr(&self.stats.publish_failures);
                Err(PublishError::TransportDegraded(e))
            }
        }
    }
}
