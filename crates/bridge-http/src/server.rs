use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::control::handle_control;
use crate::health::handle_health;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.control_max_body_bytes;
    Router::new()
        .route("/api/control", post(handle_control))
        .route("/api/health", get(handle_health))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit.saturating_add(1)))
        .with_state(state)
}

/// Binds and serves the control plane + health router until a ctrl-c
/// signal arrives, matching the teacher's graceful-shutdown convention.
pub async fn serve(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, "control/health HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
