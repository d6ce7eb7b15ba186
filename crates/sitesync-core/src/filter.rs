//! Event filtering: decides whether an authenticated request deploys.

use sitesync_types::event::WebhookEvent;
use sitesync_types::request::DeploymentRequest;
use sitesync_types::trigger::DeployTrigger;

use crate::auth::AuthMethod;

/// A request that passed authentication.
///
/// Only the trigger service constructs this, after the authenticator said
/// yes, so nothing can parse a body that has not been verified.
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    request: DeploymentRequest,
    method: AuthMethod,
}

impl AuthorizedRequest {
    pub(crate) fn new(request: DeploymentRequest, method: AuthMethod) -> Self {
        Self { request, method }
    }

    pub fn request(&self) -> &DeploymentRequest {
        &self.request
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }
}

/// Filter decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    /// Deploy with this trigger.
    Proceed(DeployTrigger),
    /// Legitimate but not deployable (other branch, other event type).
    Ignore(String),
    /// The payload could not be interpreted.
    Malformed(String),
}

/// Branch/type matching for authenticated requests.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Branch deployed by manual triggers, which carry no payload.
    manual_branch: String,
    /// When set, pushes from any other repository are ignored.
    repository: Option<String>,
}

impl EventFilter {
    pub fn new(manual_branch: impl Into<String>, repository: Option<String>) -> Self {
        Self {
            manual_branch: manual_branch.into(),
            repository,
        }
    }

    pub fn should_deploy(&self, authorized: &AuthorizedRequest) -> FilterResult {
        if authorized.method() == AuthMethod::Override {
            return FilterResult::Proceed(DeployTrigger::manual(self.manual_branch.clone()));
        }

        let request = authorized.request();
        let push = match WebhookEvent::parse(request.event_type(), request.body()) {
            Ok(WebhookEvent::Push(push)) => push,
            Ok(WebhookEvent::Unknown { event_type }) => {
                return FilterResult::Ignore(format!("not a push event: {event_type}"));
            }
            Err(malformed) => return FilterResult::Malformed(malformed.to_string()),
        };

        if let (Some(expected), Some(actual)) = (&self.repository, &push.repository) {
            if !expected.eq_ignore_ascii_case(actual) {
                return FilterResult::Ignore(format!("push from unexpected repository: {actual}"));
            }
        }

        if !push.targets_default_branch() {
            return FilterResult::Ignore(format!(
                "not {} branch: {}",
                push.default_branch, push.reference
            ));
        }

        FilterResult::Proceed(DeployTrigger::push(
            push.default_branch,
            push.repository,
            push.head_commit,
            request.delivery_id().map(String::from),
        ))
    }
}
