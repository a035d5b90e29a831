//! WebSocket handler for real-time updates.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink, Stream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::ConnectionRegistry;
use crate::state::{AppState, RealtimeConfig};

/// Liveness probe sent after an idle period.
pub const PING_PAYLOAD: &str = r#"{"type":"ping"}"#;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    ClientClosed,
    ReadError,
    WriteError,
    ProbeFailed,
    Evicted,
    Shutdown,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    let reason = serve_connection(sender, receiver, &state).await;
    info!(?reason, connections = state.registry.len(), "WebSocket client disconnected");
}

/// Accept one push connection on this instance.
///
/// The relay is started, and subscribed, before the connection is
/// registered, so no remote event published after registration is missed.
pub async fn serve_connection<W, R, E>(sender: W, receiver: R, state: &AppState) -> Disconnect
where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let relay_state = state.relay.ensure_started().await;
    if !relay_state.is_healthy() {
        warn!(relay = %relay_state, "Relay is down; this client will only see local updates");
    }

    run_connection(
        sender,
        receiver,
        &state.registry,
        &state.config,
        state.shutdown.clone(),
    )
    .await
}

/// Drive one push connection until it ends.
///
/// Registration is held by a guard for the whole call, so the connection
/// leaves the registry on every exit path, including when this future is
/// dropped mid-await.
pub async fn run_connection<W, R, E>(
    mut sender: W,
    mut receiver: R,
    registry: &Arc<ConnectionRegistry>,
    config: &RealtimeConfig,
    shutdown: CancellationToken,
) -> Disconnect
where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let (tx, mut outbound) = mpsc::channel::<String>(config.outbound_buffer.max(1));
    let registration = registry.register(tx);
    let conn = Arc::clone(registration.connection());
    let conn_id = registration.id();
    info!(conn_id, connections = registry.len(), "WebSocket client connected");

    let idle = tokio::time::sleep(config.idle_timeout);
    tokio::pin!(idle);

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Disconnect::Shutdown,
            _ = conn.closed() => break Disconnect::Evicted,
            queued = outbound.recv() => match queued {
                Some(payload) => {
                    debug!(conn_id, message = %payload, "Sending message to WebSocket client");
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        debug!(conn_id, "WebSocket send failed, client disconnected");
                        break Disconnect::WriteError;
                    }
                    idle.as_mut().reset(Instant::now() + config.idle_timeout);
                }
                None => break Disconnect::Evicted,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(conn_id, "WebSocket client sent close frame");
                    break Disconnect::ClientClosed;
                }
                Some(Ok(msg)) => {
                    if let Message::Text(text) = &msg {
                        debug!(conn_id, message = %text.as_str(), "Received from WebSocket client");
                    }
                    idle.as_mut().reset(Instant::now() + config.idle_timeout);
                }
                Some(Err(e)) => {
                    debug!(conn_id, error = %e, "WebSocket read failed");
                    break Disconnect::ReadError;
                }
            },
            _ = &mut idle => {
                if sender.send(Message::Text(PING_PAYLOAD.into())).await.is_err() {
                    debug!(conn_id, "Liveness probe failed");
                    break Disconnect::ProbeFailed;
                }
                idle.as_mut().reset(Instant::now() + config.idle_timeout);
            }
        }
    };

    drop(registration);
    let _ = sender.close().await;
    reason
}
