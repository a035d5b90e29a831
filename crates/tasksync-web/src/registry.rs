//! Registry of live push connections for this process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Why a payload could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The lifecycle handler is gone.
    Closed,
    /// The client is not draining its queue.
    Full,
}

/// One client's outbound side, as seen by broadcasters.
pub struct ClientConnection {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
    connected_at: Instant,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
        }
    }

    /// Queue a payload without waiting.
    pub fn try_deliver(&self, payload: &str) -> Result<(), DeliveryFailure> {
        if self.is_closed() {
            return Err(DeliveryFailure::Closed);
        }
        self.tx.try_send(payload.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }

    /// Mark the connection dead. Its lifecycle handler observes this via
    /// [`ClientConnection::closed`] and exits.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Set of live connections shared by every lifecycle handler and the relay.
///
/// The lock is held only for membership changes and to snapshot the
/// membership; payloads are queued after it is released.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    next_id: AtomicU64,
    evictions: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            evictions: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh connection id.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert a connection. Returns `false` if it was already present.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write();
        if conns.contains_key(&connection.id) {
            return false;
        }
        conns.insert(connection.id, connection);
        true
    }

    /// Remove a connection if present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(&id)
    }

    /// Create and add a connection whose membership ends when the returned
    /// guard is dropped.
    pub fn register(self: &Arc<Self>, tx: mpsc::Sender<String>) -> Registration {
        let connection = Arc::new(ClientConnection::new(self.next_id(), tx));
        self.add(connection.clone());
        debug!(conn_id = connection.id, connections = self.len(), "Connection registered");
        Registration {
            registry: Arc::clone(self),
            connection,
        }
    }

    /// Queue `payload` for every connection registered right now.
    ///
    /// A connection that cannot accept the payload is evicted and closed;
    /// the others still receive it.
    pub fn broadcast_all(&self, payload: &str) {
        let snapshot: Vec<Arc<ClientConnection>> =
            self.connections.read().values().cloned().collect();
        debug!(recipients = snapshot.len(), "Broadcasting to connections");

        for conn in snapshot {
            if let Err(failure) = conn.try_deliver(payload) {
                self.evict(&conn, failure);
            }
        }
    }

    fn evict(&self, conn: &Arc<ClientConnection>, failure: DeliveryFailure) {
        let removed = {
            let mut conns = self.connections.write();
            match conns.get(&conn.id) {
                Some(current) if Arc::ptr_eq(current, conn) => conns.remove(&conn.id),
                _ => None,
            }
        };
        conn.close();
        if removed.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            warn!(conn_id = conn.id, ?failure, "Evicted connection after failed delivery");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Connections removed because a broadcast could not reach them.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registry membership. Dropping it deregisters and closes the
/// connection, on every exit path including task cancellation.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    connection: Arc<ClientConnection>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }

    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.connection.close();
        if self.registry.remove(self.connection.id).is_some() {
            debug!(
                conn_id = self.connection.id,
                connected_for = ?self.connection.age(),
                "Connection deregistered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new())
    }

    #[test]
    fn add_is_idempotent() {
        let reg = registry();
        let (tx, _rx) = mpsc::channel(4);
        let conn = Arc::new(ClientConnection::new(reg.next_id(), tx));
        assert!(reg.add(conn.clone()));
        assert!(!reg.add(conn));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_nonexistent_is_noop() {
        let reg = registry();
        assert!(reg.remove(42).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn registration_drop_deregisters() {
        let reg = registry();
        let (tx, _rx) = mpsc::channel(4);
        let registration = reg.register(tx);
        let id = registration.id();
        let conn = registration.connection().clone();
        assert!(reg.contains(id));

        drop(registration);
        assert!(!reg.contains(id));
        assert!(conn.is_closed());
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let reg = registry();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let _r1 = reg.register(tx1);
        let _r2 = reg.register(tx2);

        reg.broadcast_all("event");
        assert_eq!(rx1.try_recv().unwrap(), "event");
        assert_eq!(rx2.try_recv().unwrap(), "event");
    }

    #[test]
    fn dead_connection_is_evicted_without_blocking_others() {
        let reg = registry();
        let (tx_dead, rx_dead) = mpsc::channel(4);
        let (tx_live, mut rx_live) = mpsc::channel(4);
        let dead = reg.register(tx_dead);
        let _live = reg.register(tx_live);
        drop(rx_dead);

        reg.broadcast_all("first");
        assert_eq!(rx_live.try_recv().unwrap(), "first");
        assert!(!reg.contains(dead.id()));
        assert!(dead.connection().is_closed());
        assert_eq!(reg.evictions(), 1);

        reg.broadcast_all("second");
        assert_eq!(rx_live.try_recv().unwrap(), "second");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.evictions(), 1);
    }

    #[test]
    fn full_queue_evicts_slow_consumer() {
        let reg = registry();
        let (tx, mut rx) = mpsc::channel(1);
        let slow = reg.register(tx);

        reg.broadcast_all("one");
        reg.broadcast_all("two");
        assert!(!reg.contains(slow.id()));
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn connection_added_after_snapshot_is_not_reached() {
        let reg = registry();
        reg.broadcast_all("before");
        let (tx, mut rx) = mpsc::channel(4);
        let _late = reg.register(tx);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_register_broadcast_remove() {
        let reg = registry();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (tx, _rx) = mpsc::channel(64);
                    let registration = reg.register(tx);
                    reg.broadcast_all("tick");
                    tokio::task::yield_now().await;
                    drop(registration);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(reg.is_empty());
    }
}
