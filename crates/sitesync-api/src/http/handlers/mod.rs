//! Endpoint handlers.

pub mod sync;
pub mod worker;

use std::time::Instant;

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use sitesync_core::trigger::TriggerResponse;
use sitesync_types::trigger::{DeployTrigger, TriggerSource};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;

pub type HandlerResult = Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError>;

/// Map a trigger outcome onto the wire.
///
/// 202 dispatched, 200 ignored, 403 unauthenticated, 400 malformed,
/// 500 dispatch failure.
pub fn respond(response: TriggerResponse, request_id: String, start: Instant) -> HandlerResult {
    let elapsed = start.elapsed().as_millis() as u64;
    match response {
        TriggerResponse::Accepted(trigger) => Ok((
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(accepted_body(&trigger), request_id, elapsed)),
        )),
        TriggerResponse::Ignored(reason) => Ok((
            StatusCode::OK,
            Json(ApiResponse::success(
                json!({ "status": "ignored", "reason": reason }),
                request_id,
                elapsed,
            )),
        )),
        TriggerResponse::Unauthorized(reason) => Err(AppError::Forbidden(reason.to_string())),
        TriggerResponse::Malformed(reason) => Err(AppError::Malformed(reason)),
        TriggerResponse::DispatchFailed(e) => Err(AppError::DispatchFailed(e.to_string())),
    }
}

fn accepted_body(trigger: &DeployTrigger) -> serde_json::Value {
    let mut body = json!({
        "status": "accepted",
        "trigger": trigger.kind(),
        "branch": trigger.branch,
    });
    if let TriggerSource::Push {
        head_commit: Some(commit),
        ..
    } = &trigger.source
    {
        body["head_commit"] = json!(commit);
    }
    body
}
