//! The trigger: authenticate, filter, dispatch.
//!
//! Request-scoped and non-blocking. The pipeline outcome is never reported
//! back here; only whether the hand-off to the worker succeeded.

use sitesync_types::error::{AuthError, DispatchError};
use sitesync_types::request::DeploymentRequest;
use sitesync_types::trigger::DeployTrigger;

use crate::auth::{AuthResult, Authenticator};
use crate::dispatch::{AckResult, Dispatcher};
use crate::filter::{AuthorizedRequest, EventFilter, FilterResult};

/// What the trigger tells its caller.
#[derive(Debug)]
pub enum TriggerResponse {
    /// A run was handed to the worker.
    Accepted(DeployTrigger),
    /// Authenticated but nothing to deploy.
    Ignored(String),
    Unauthorized(AuthError),
    Malformed(String),
    /// The worker could not be reached or refused the run.
    DispatchFailed(DispatchError),
}

/// Authenticates and filters inbound requests, then dispatches.
pub struct TriggerService<D> {
    authenticator: Authenticator,
    filter: EventFilter,
    dispatcher: D,
}

impl<D: Dispatcher> TriggerService<D> {
    pub fn new(authenticator: Authenticator, filter: EventFilter, dispatcher: D) -> Self {
        Self {
            authenticator,
            filter,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Handle one inbound webhook or manual trigger.
    pub async fn handle(&self, request: DeploymentRequest) -> TriggerResponse {
        let delivery_id = request.delivery_id().unwrap_or("-").to_string();

        let method = match self.authenticator.authenticate(&request) {
            AuthResult::Authorized(method) => method,
            AuthResult::Unauthorized(reason) => {
                tracing::warn!(delivery_id = %delivery_id, reason = %reason, "rejected unauthenticated trigger");
                return TriggerResponse::Unauthorized(reason);
            }
        };

        let authorized = AuthorizedRequest::new(request, method);
        let trigger = match self.filter.should_deploy(&authorized) {
            FilterResult::Proceed(trigger) => trigger,
            FilterResult::Ignore(reason) => {
                tracing::debug!(delivery_id = %delivery_id, reason = %reason, "ignoring trigger");
                return TriggerResponse::Ignored(reason);
            }
            FilterResult::Malformed(reason) => {
                tracing::warn!(delivery_id = %delivery_id, reason = %reason, "malformed trigger payload");
                return TriggerResponse::Malformed(reason);
            }
        };

        tracing::info!(
            delivery_id = %delivery_id,
            auth = ?method,
            trigger = trigger.kind(),
            branch = %trigger.branch,
            "dispatching deployment"
        );
        self.dispatch(trigger).await
    }

    /// Handle a trigger forwarded by another process's dispatcher.
    ///
    /// The sender already authenticated and filtered the original request;
    /// the hop itself is authorized by the override credential alone. The
    /// body is only parsed once the credential checks out.
    pub async fn handle_forwarded(&self, credential: Option<&[u8]>, body: &[u8]) -> TriggerResponse {
        let verdict = match credential.filter(|c| !c.is_empty()) {
            Some(provided) => self.authenticator.verify_override(provided),
            None => Err(AuthError::BadOverrideCredential),
        };
        if let Err(reason) = verdict {
            tracing::warn!(reason = %reason, "rejected forwarded trigger");
            return TriggerResponse::Unauthorized(reason);
        }

        let trigger: DeployTrigger = match serde_json::from_slice(body) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::warn!(error = %e, "malformed forwarded trigger");
                return TriggerResponse::Malformed(e.to_string());
            }
        };

        tracing::info!(
            trigger = trigger.kind(),
            branch = %trigger.branch,
            "accepted forwarded deployment"
        );
        self.dispatch(trigger).await
    }

    async fn dispatch(&self, trigger: DeployTrigger) -> TriggerResponse {
        match self.dispatcher.dispatch(trigger.clone()).await {
            AckResult::Accepted => TriggerResponse::Accepted(trigger),
            AckResult::Rejected(e) => {
                tracing::error!(error = %e, "failed to dispatch deployment");
                TriggerResponse::DispatchFailed(e)
            }
        }
    }
}
