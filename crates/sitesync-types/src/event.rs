//! Webhook event payloads.
//!
//! Events form a closed set: a `push` is parsed into [`PushEvent`], every
//! other declared type is carried as [`WebhookEvent::Unknown`] without
//! touching the body. Parsing a push is total: missing fields are reported
//! as [`MalformedEvent`] rather than defaulted.

use serde::{Deserialize, Serialize};

/// Prefix of a fully qualified branch ref.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Event type label assumed when the sender did not declare one.
pub const PUSH_EVENT: &str = "push";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A parsed webhook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A push to some ref of the repository.
    Push(PushEvent),
    /// Any other event type (`ping`, `issues`, ...). Never deploys.
    Unknown { event_type: String },
}

/// The fields of a push notification that drive deployment decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// The ref that was updated, e.g. `refs/heads/master`.
    pub reference: String,
    /// Repository identifier (`owner/name`), when the payload carries one.
    pub repository: Option<String>,
    /// The repository's configured default branch.
    pub default_branch: String,
    /// Commit id the ref now points to.
    pub head_commit: Option<String>,
}

impl PushEvent {
    /// The ref a push must update to be deployable.
    pub fn default_branch_ref(&self) -> String {
        format!("{BRANCH_REF_PREFIX}{}", self.default_branch)
    }

    /// Whether this push updated the repository's default branch.
    pub fn targets_default_branch(&self) -> bool {
        self.reference == self.default_branch_ref()
    }
}

/// Why a payload could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MalformedEvent(pub String);

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawPush {
    #[serde(rename = "ref")]
    reference: Option<String>,
    after: Option<String>,
    repository: Option<RawRepository>,
}

#[derive(Deserialize)]
struct RawRepository {
    full_name: Option<String>,
    default_branch: Option<String>,
}

impl WebhookEvent {
    /// Interpret a declared event type and body.
    ///
    /// A missing event type is judged as a push. Unknown types are returned
    /// as-is and their body is never inspected.
    pub fn parse(event_type: Option<&str>, body: &[u8]) -> Result<Self, MalformedEvent> {
        let event_type = event_type.map(str::trim).unwrap_or(PUSH_EVENT);
        if !event_type.eq_ignore_ascii_case(PUSH_EVENT) {
            return Ok(WebhookEvent::Unknown {
                event_type: event_type.to_string(),
            });
        }

        let raw: RawPush = serde_json::from_slice(body)
            .map_err(|e| MalformedEvent(format!("payload is not a push event: {e}")))?;

        let reference = raw
            .reference
            .ok_or_else(|| MalformedEvent("missing key 'ref'".to_string()))?;
        let repository = raw
            .repository
            .ok_or_else(|| MalformedEvent("missing key 'repository'".to_string()))?;
        let default_branch = repository
            .default_branch
            .ok_or_else(|| MalformedEvent("missing key 'repository.default_branch'".to_string()))?;

        Ok(WebhookEvent::Push(PushEvent {
            reference,
            repository: repository.full_name,
            default_branch,
            head_commit: raw.after,
        }))
    }
}
