//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tasksync_core::{MemoryBus, MemoryTaskStore};
use tasksync_web::{AppState, RealtimeConfig, Registration};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// One in-process server instance.
pub struct Instance {
    pub state: AppState,
    pub app: Router,
}

impl Instance {
    pub fn new(store: Arc<MemoryTaskStore>, bus: Arc<MemoryBus>) -> Self {
        let state = AppState::new(store, bus, RealtimeConfig::default());
        let app = tasksync_web::create_router(state.clone());
        Self { state, app }
    }

    /// Start the relay the way the first push connection would.
    pub async fn start_relay(&self) {
        let relay_state = self.state.relay.ensure_started().await;
        assert!(relay_state.is_healthy(), "relay failed to start: {relay_state}");
    }

    /// Register a bare connection and return its inbox.
    pub fn connect(&self) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let registration = self.state.registry.register(tx);
        Client {
            _registration: registration,
            rx,
        }
    }

    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

pub struct Client {
    _registration: Registration,
    pub rx: mpsc::Receiver<String>,
}

impl Client {
    /// Simulate the client side going away without deregistering.
    pub fn hang_up(&mut self) {
        self.rx.close();
    }

    /// Next event, failing the test if none arrives within a second.
    pub async fn next_event(&mut self) -> Value {
        let payload = tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed");
        serde_json::from_str(&payload).unwrap()
    }

    /// Assert nothing else is queued once in-flight relays have settled.
    pub async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Ok(extra) = self.rx.try_recv() {
            panic!("unexpected extra event: {extra}");
        }
    }
}

pub fn shared_backend() -> (Arc<MemoryTaskStore>, Arc<MemoryBus>) {
    (Arc::new(MemoryTaskStore::new()), Arc::new(MemoryBus::new()))
}
