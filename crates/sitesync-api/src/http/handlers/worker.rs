//! Forwarded-run handler for worker mode.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use sitesync_types::request::OVERRIDE_HEADER;
use uuid::Uuid;

use super::{respond, HandlerResult};
use crate::state::AppState;

/// POST /worker/runs - Start a run for a trigger validated by another process.
///
/// Authorized by the override credential header only. Answers 202 as soon
/// as the run is spawned.
pub async fn receive_forwarded_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let credential = headers.get(OVERRIDE_HEADER).map(|v| v.as_bytes());
    let response = state.trigger.handle_forwarded(credential, &body).await;
    respond(response, request_id, start)
}
