//! Mantle IPC router
//!
//! Loopback HTTP surface exposing the session's tool catalog to
//! external processes. Binds an ephemeral port on 127.0.0.1 only; the
//! bound address is returned so callers can advertise it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use mantle_core::agent::cancel::AbortHandle;
use mantle_core::tools::ToolBroker;

pub mod error;
pub mod routes;

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<ToolBroker>,
    pub abort: AbortHandle,
}

/// A started router: where it listens and the serving task.
pub struct RouterHandle {
    pub addr: SocketAddr,
    pub task: JoinHandle<()>,
}

impl RouterHandle {
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

/// Build the Axum router with all IPC routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/list_tools", get(routes::list_tools))
        .route("/call_tool", post(routes::call_tool))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind a loopback ephemeral port and serve until shut down.
pub async fn start_router(state: AppState) -> anyhow::Result<RouterHandle> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = build_router(state);

    tracing::info!("IPC router listening on http://{}", addr);

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("IPC router stopped: {}", e);
        }
    });

    Ok(RouterHandle { addr, task })
}
