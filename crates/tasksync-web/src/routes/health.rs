//! Health and greeting endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::stats::StatsSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub relay: String,
    pub connections: usize,
    pub origin: String,
    pub stats: StatsSnapshot,
}

/// Fails with 503 once the relay has failed or stopped: mutations would
/// still succeed but other instances' clients would no longer see them.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let relay = state.relay.state();
    let healthy = relay.is_healthy();
    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        relay: relay.to_string(),
        connections: state.registry.len(),
        origin: state.origin().to_string(),
        stats: state.stats.snapshot(state.registry.evictions()),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

pub async fn hello() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello from the Tasksync API" }))
}
