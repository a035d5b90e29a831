//! Application state.

use std::sync::Arc;
use std::time::Duration;

use tasksync_core::task::model::{ChangeAction, Task};
use tasksync_core::{EventBus, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::publisher::ChangePublisher;
use crate::registry::ConnectionRegistry;
use crate::relay::RelayListener;
use crate::stats::FanoutStats;

/// Default bus channel for task change events.
pub const DEFAULT_CHANNEL: &str = "task_updates";

/// Real-time fanout settings.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Bus channel shared by every instance.
    pub channel: String,
    /// Quiet period after which a liveness probe is sent.
    pub idle_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            idle_timeout: Duration::from_secs(30),
            outbound_buffer: 256,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: Arc<ChangePublisher>,
    pub relay: Arc<RelayListener>,
    pub stats: Arc<FanoutStats>,
    pub config: RealtimeConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire up one server instance. Each instance gets its own origin id.
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<dyn EventBus>, config: RealtimeConfig) -> Self {
        let origin = Uuid::new_v4().to_string();
        let shutdown = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(FanoutStats::default());
        let publisher = Arc::new(ChangePublisher::new(
            origin.as_str(),
            config.channel.as_str(),
            bus.clone(),
            registry.clone(),
            stats.clone(),
        ));
        let relay = Arc::new(RelayListener::new(
            origin,
            config.channel.as_str(),
            bus,
            registry.clone(),
            stats.clone(),
            shutdown.clone(),
        ));
        Self {
            store,
            registry,
            publisher,
            relay,
            stats,
            config,
            shutdown,
        }
    }

    pub fn origin(&self) -> &str {
        self.publisher.origin()
    }

    /// Announce a committed mutation. Delivery problems are logged, never
    /// returned: the write already succeeded.
    pub async fn notify(&self, action: ChangeAction, task: &Task) {
        if let Err(e) = self.publisher.publish(action, task).await {
            warn!(
                action = action.as_str(),
                task_id = %task.id,
                error = %e,
                "Change delivery degraded; remote instances may miss this event"
            );
        }
    }
}
