//! Tasksync Web Server
//!
//! Axum server for the task CRUD API and the real-time push channel.
//! Mutations are fanned out to this instance's WebSocket clients directly
//! and to every other instance through the shared bus.

pub mod publisher;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod state;
pub mod stats;
pub mod websocket;

use axum::{
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use registry::{ClientConnection, ConnectionId, ConnectionRegistry, Registration};
pub use relay::{RelayListener, RelayState};
pub use state::{AppState, RealtimeConfig};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/tasks/{id}",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(routes::health::health))
        .route("/api/hello", get(routes::health::hello))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server until `state.shutdown` is cancelled.
pub async fn run_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Web server listening on http://{}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("Web server stopped");
    Ok(())
}
