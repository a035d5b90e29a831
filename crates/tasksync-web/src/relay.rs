//! Relay listener: forwards change events from the shared bus to this
//! process's connections.
//!
//! One relay exists per process. It subscribes lazily, on the first push
//! connection, and never resubscribes after a transport failure; the health
//! endpoint reports the failure instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tasksync_core::{EventBus, MessageStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::ConnectionRegistry;
use crate::stats::FanoutStats;

/// Sequence numbers remembered per origin for duplicate suppression.
const SEEN_WINDOW: usize = 1024;

/// Origins tracked at once; the least recently active is forgotten first.
const MAX_ORIGINS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    NotStarted,
    Subscribing,
    Listening,
    Failed(String),
    Stopped,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Subscribing => "subscribing",
            Self::Listening => "listening",
            Self::Failed(_) => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Whether real-time fanout can still work in this state.
    pub fn is_healthy(&self) -> bool {
        !matches!(self, Self::Failed(_) | Self::Stopped)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The routing fields of a bus payload. Everything else is forwarded as is.
#[derive(Deserialize)]
struct EventHeader {
    origin: Option<String>,
    seq: Option<u64>,
}

/// Recently forwarded sequence numbers of one origin.
#[derive(Default)]
struct SeenWindow {
    order: VecDeque<u64>,
    seen: HashSet<u64>,
    last_active: u64,
}

impl SeenWindow {
    /// Record `seq`. Returns `false` if it was already recorded.
    fn insert(&mut self, seq: u64) -> bool {
        if !self.seen.insert(seq) {
            return false;
        }
        self.order.push_back(seq);
        if self.order.len() > SEEN_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Default)]
struct Dedup {
    origins: HashMap<String, SeenWindow>,
    clock: u64,
}

impl Dedup {
    /// Returns `true` the first time an `(origin, seq)` pair is offered.
    fn first_sighting(&mut self, origin: &str, seq: u64) -> bool {
        self.clock += 1;
        if !self.origins.contains_key(origin) && self.origins.len() >= MAX_ORIGINS {
            let stalest = self
                .origins
                .iter()
                .min_by_key(|(_, window)| window.last_active)
                .map(|(origin, _)| origin.clone());
            if let Some(stalest) = stalest {
                self.origins.remove(&stalest);
            }
        }
        let window = self.origins.entry(origin.to_string()).or_default();
        window.last_active = self.clock;
        window.insert(seq)
    }
}

pub struct RelayListener {
    origin: String,
    channel: String,
    bus: Arc<dyn EventBus>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<FanoutStats>,
    shutdown: CancellationToken,
    state: RwLock<RelayState>,
    start_gate: tokio::sync::Mutex<()>,
    dedup: Mutex<Dedup>,
}

impl RelayListener {
    pub fn new(
        origin: impl Into<String>,
        channel: impl Into<String>,
        bus: Arc<dyn EventBus>,
        registry: Arc<ConnectionRegistry>,
        stats: Arc<FanoutStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            origin: origin.into(),
            channel: channel.into(),
            bus,
            registry,
            stats,
            shutdown,
            state: RwLock::new(RelayState::NotStarted),
            start_gate: tokio::sync::Mutex::new(()),
            dedup: Mutex::new(Dedup::default()),
        }
    }

    pub fn state(&self) -> RelayState {
        self.state.read().clone()
    }

    fn set_state(&self, state: RelayState) {
        debug!(channel = %self.channel, state = %state, "Relay state changed");
        *self.state.write() = state;
    }

    /// Start the relay if nobody has yet.
    ///
    /// Concurrent callers wait for the same subscription attempt, so once
    /// this returns `Listening` the subscription is in place and no event
    /// published afterwards can be missed.
    pub async fn ensure_started(self: &Arc<Self>) -> RelayState {
        let current = self.state();
        if current != RelayState::NotStarted {
            return current;
        }

        let _gate = self.start_gate.lock().await;
        let current = self.state();
        if current != RelayState::NotStarted {
            return current;
        }
        if self.shutdown.is_cancelled() {
            self.set_state(RelayState::Stopped);
            return self.state();
        }

        self.set_state(RelayState::Subscribing);
        match self.bus.subscribe(&self.channel).await {
            Ok(messages) => {
                self.set_state(RelayState::Listening);
                info!(channel = %self.channel, origin = %self.origin, "Relay listener subscribed");
                let relay = Arc::clone(self);
                tokio::spawn(async move { relay.listen(messages).await });
            }
            Err(e) => {
                FanoutStats::incr(&self.stats.relay_failures);
                error!(channel = %self.channel, error = %e, "Relay listener failed to subscribe");
                self.set_state(RelayState::Failed(e.to_string()));
            }
        }
        self.state()
    }

    async fn listen(&self, mut messages: MessageStream) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(channel = %self.channel, "Relay listener stopped");
                    self.set_state(RelayState::Stopped);
                    return;
                }
                next = messages.next() => match next {
                    Some(Ok(payload)) => self.forward(&payload),
                    Some(Err(e)) if e.is_transient() => {
                        FanoutStats::incr(&self.stats.relay_malformed);
                        warn!(channel = %self.channel, error = %e, "Dropping undecodable bus message");
                    }
                    Some(Err(e)) => {
                        FanoutStats::incr(&self.stats.relay_failures);
                        error!(channel = %self.channel, error = %e, "Relay listener failed; real-time fanout is down");
                        self.set_state(RelayState::Failed(e.to_string()));
                        return;
                    }
                    None => {
                        FanoutStats::incr(&self.stats.relay_failures);
                        error!(channel = %self.channel, "Relay subscription ended; real-time fanout is down");
                        self.set_state(RelayState::Failed("subscription closed".to_string()));
                        return;
                    }
                }
            }
        }
    }

    /// Forward one bus payload to local connections unless it originated
    /// here or was already forwarded.
    pub fn forward(&self, payload: &str) {
        let header: EventHeader = match serde_json::from_str(payload) {
            Ok(header) => header,
            Err(e) => {
                FanoutStats::incr(&self.stats.relay_malformed);
                warn!(error = %e, "Dropping malformed bus message");
                return;
            }
        };

        if let Some(origin) = header.origin.as_deref() {
            if origin == self.origin {
                FanoutStats::incr(&self.stats.relay_skipped_local);
                return;
            }
            if let Some(seq) = header.seq {
                if !self.dedup.lock().first_sighting(origin, seq) {
                    FanoutStats::incr(&self.stats.relay_skipped_duplicate);
                    debug!(origin, seq, "Skipping redelivered event");
                    return;
                }
            }
        }

        FanoutStats::incr(&self.stats.relay_forwarded);
        self.registry.broadcast_all(payload);
    }
}
