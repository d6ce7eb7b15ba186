//! Inbound trigger handler.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use sitesync_types::request::{
    DELIVERY_HEADER, DeploymentRequest, EVENT_TYPE_HEADER, OVERRIDE_HEADER, SIGNATURE_SHA1_HEADER,
    SIGNATURE_SHA256_HEADER,
};
use uuid::Uuid;

use super::{respond, HandlerResult};
use crate::state::AppState;

/// POST /sync - Receive a webhook notification or manual trigger.
///
/// Authentication is either the override header (manual trigger) or an HMAC
/// signature over the raw body. The response only says whether a run was
/// handed off; the run itself continues in the background.
pub async fn receive_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let request = deployment_request(&headers, body);
    let response = state.trigger.handle(request).await;
    respond(response, request_id, start)
}

/// Collect the headers the trigger cares about.
///
/// `X-Hub-Signature-256` is preferred over the legacy `X-Hub-Signature`.
/// Credential headers are taken as received even when they are not visible
/// ASCII, so a garbled value is rejected rather than mistaken for absent.
pub fn deployment_request(headers: &HeaderMap, body: Bytes) -> DeploymentRequest {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let signature = headers
        .get(SIGNATURE_SHA256_HEADER)
        .or_else(|| headers.get(SIGNATURE_SHA1_HEADER))
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    let mut request = DeploymentRequest::new(body.to_vec());
    if let Some(signature) = signature {
        request = request.with_signature(signature);
    }
    if let Some(credential) = headers.get(OVERRIDE_HEADER) {
        request = request.with_override_credential(credential.as_bytes());
    }
    if let Some(event_type) = header(EVENT_TYPE_HEADER) {
        request = request.with_event_type(event_type);
    }
    if let Some(delivery_id) = header(DELIVERY_HEADER) {
        request = request.with_delivery_id(delivery_id);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_sha256_signature() {
        let mut headers = HeaderMap::new();
        headers.insert("x-hub-signature", HeaderValue::from_static("sha1=aaaa"));
        headers.insert("x-hub-signature-256", HeaderValue::from_static("sha256=bbbb"));
        headers.insert("x-github-event", HeaderValue::from_static("push"));
        headers.insert("x-github-delivery", HeaderValue::from_static("d-1"));

        let request = deployment_request(&headers, Bytes::from_static(b"{}"));

        assert_eq!(request.signature(), Some("sha256=bbbb"));
        assert_eq!(request.event_type(), Some("push"));
        assert_eq!(request.delivery_id(), Some("d-1"));
        assert_eq!(request.body(), b"{}");
        assert!(request.override_credential().is_none());
    }

    #[test]
    fn falls_back_to_sha1_and_reads_override() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Hub-Signature", HeaderValue::from_static("sha1=aaaa"));
        headers.insert("X-Sitesync-Key", HeaderValue::from_static("let-me-in"));

        let request = deployment_request(&headers, Bytes::new());

        assert_eq!(request.signature(), Some("sha1=aaaa"));
        assert_eq!(request.override_credential(), Some(b"let-me-in".as_slice()));
    }

    #[test]
    fn non_ascii_credentials_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert("x-sitesync-key", HeaderValue::from_bytes(b"wr\xf6ng").unwrap());
        headers.insert("x-hub-signature-256", HeaderValue::from_bytes(b"sha256=\xf6").unwrap());

        let request = deployment_request(&headers, Bytes::new());

        assert_eq!(request.override_credential(), Some(b"wr\xf6ng".as_slice()));
        assert!(request.signature().is_some());
    }
}
