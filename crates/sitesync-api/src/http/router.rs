//! Axum router configuration with middleware.
//!
//! The trigger process serves `/sync`; a worker process serves
//! `/worker/runs`. Both serve `/health`. Middleware: tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Which endpoints a process exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Trigger,
    Worker,
}

/// Build the router for `role` with all routes and middleware.
pub fn build_router(state: AppState, role: Role) -> Router {
    let routes = match role {
        Role::Trigger => Router::new().route("/sync", post(handlers::sync::receive_trigger)),
        Role::Worker => Router::new().route(
            sitesync_infra::dispatch::WORKER_RUNS_PATH,
            post(handlers::worker::receive_forwarded_run),
        ),
    };

    routes
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness check (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
