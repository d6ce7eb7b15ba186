//! Hand-off to a separate worker process over HTTP.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sitesync_core::dispatch::{AckResult, Dispatcher};
use sitesync_core::retry::RetryPolicy;
use sitesync_types::config::DispatchRetryConfig;
use sitesync_types::error::{BoxError, DispatchError};
use sitesync_types::request::OVERRIDE_HEADER;
use sitesync_types::trigger::DeployTrigger;

/// Path the worker accepts forwarded triggers on.
pub const WORKER_RUNS_PATH: &str = "/worker/runs";

/// Response bodies longer than this are cut in error messages.
const MAX_ERROR_BODY: usize = 512;

/// POSTs validated triggers to a worker, authenticated with the override
/// credential.
///
/// Transport failures and 5xx answers are retried per the [`RetryPolicy`];
/// any other non-success status is a refusal and is not retried.
pub struct RemoteWorkerDispatcher {
    http: reqwest::Client,
    endpoint: String,
    credential: SecretString,
    retry: RetryPolicy,
}

enum AttemptError {
    Transport(BoxError),
    Status { status: u16, body: String },
}

impl RemoteWorkerDispatcher {
    pub fn new(
        worker_url: &str,
        credential: SecretString,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("sitesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: format!("{}{WORKER_RUNS_PATH}", worker_url.trim_end_matches('/')),
            credential,
            retry,
        }
    }

    pub fn from_config(worker_url: &str, credential: SecretString, config: &DispatchRetryConfig) -> Self {
        Self::new(
            worker_url,
            credential,
            RetryPolicy::from(config),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, trigger: &DeployTrigger) -> Result<(), AttemptError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(OVERRIDE_HEADER, self.credential.expose_secret())
            .json(trigger)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(Box::new(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
            body.truncate(cut);
        }
        Err(AttemptError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl Dispatcher for RemoteWorkerDispatcher {
    async fn dispatch(&self, trigger: DeployTrigger) -> AckResult {
        let mut attempt = 1;
        loop {
            let error = match self.attempt(&trigger).await {
                Ok(()) => {
                    tracing::info!(endpoint = %self.endpoint, attempt, "worker accepted deployment");
                    return AckResult::Accepted;
                }
                Err(AttemptError::Status { status, body }) if status < 500 => {
                    return AckResult::Rejected(DispatchError::Refused { status, body });
                }
                Err(error) => error,
            };

            if !self.retry.should_retry(attempt) {
                let error = match error {
                    AttemptError::Transport(source) => DispatchError::Unreachable {
                        attempts: attempt,
                        source,
                    },
                    AttemptError::Status { status, body } => DispatchError::Refused { status, body },
                };
                return AckResult::Rejected(error);
            }

            let delay = self.retry.backoff_after(attempt);
            match &error {
                AttemptError::Transport(e) => {
                    tracing::warn!(attempt, error = %e, ?delay, "worker unreachable, retrying")
                }
                AttemptError::Status { status, .. } => {
                    tracing::warn!(attempt, status, ?delay, "worker failed, retrying")
                }
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    #[derive(Clone)]
    struct Worker {
        calls: Arc<AtomicUsize>,
        /// Status per call; the last entry repeats.
        statuses: Arc<Vec<StatusCode>>,
        received: Arc<Mutex<Vec<(Option<String>, DeployTrigger)>>>,
    }

    async fn runs(
        State(worker): State<Worker>,
        headers: HeaderMap,
        Json(trigger): Json<DeployTrigger>,
    ) -> (StatusCode, &'static str) {
        let n = worker.calls.fetch_add(1, Ordering::SeqCst);
        let credential = headers
            .get(OVERRIDE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        worker.received.lock().unwrap().push((credential, trigger));
        let status = worker.statuses[n.min(worker.statuses.len() - 1)];
        (status, "worker says no")
    }

    async fn spawn_worker(statuses: Vec<StatusCode>) -> (String, Worker) {
        let worker = Worker {
            calls: Arc::default(),
            statuses: Arc::new(statuses),
            received: Arc::default(),
        };
        let app = Router::new()
            .route(WORKER_RUNS_PATH, post(runs))
            .with_state(worker.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), worker)
    }

    fn dispatcher(url: &str, retry: RetryPolicy) -> RemoteWorkerDispatcher {
        RemoteWorkerDispatcher::new(
            url,
            SecretString::from("override-key"),
            retry,
            Duration::from_secs(5),
        )
    }

    fn quick_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn endpoint_joins_worker_path() {
        let d = dispatcher("http://127.0.0.1:4001/", RetryPolicy::none());
        assert_eq!(d.endpoint(), "http://127.0.0.1:4001/worker/runs");
    }

    #[tokio::test]
    async fn dispatch_forwards_trigger_with_credential() {
        let (url, worker) = spawn_worker(vec![StatusCode::ACCEPTED]).await;
        let trigger = DeployTrigger::push(
            "master",
            Some("umwics/wics-site".to_string()),
            Some("abc123".to_string()),
            Some("delivery-1".to_string()),
        );

        let ack = dispatcher(&url, RetryPolicy::none())
            .dispatch(trigger.clone())
            .await;

        assert!(ack.is_accepted());
        let received = worker.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some("override-key"));
        assert_eq!(received[0].1, trigger);
    }

    #[tokio::test]
    async fn client_error_is_refused_without_retry() {
        let (url, worker) = spawn_worker(vec![StatusCode::FORBIDDEN]).await;

        let ack = dispatcher(&url, quick_retries(3))
            .dispatch(DeployTrigger::manual("master"))
            .await;

        assert!(matches!(
            ack,
            AckResult::Rejected(DispatchError::Refused { status: 403, ref body }) if body == "worker says no"
        ));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success() {
        let (url, worker) = spawn_worker(vec![
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::ACCEPTED,
        ])
        .await;

        let ack = dispatcher(&url, quick_retries(3))
            .dispatch(DeployTrigger::manual("master"))
            .await;

        assert!(ack.is_accepted());
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn default_policy_makes_a_single_attempt() {
        let (url, worker) = spawn_worker(vec![StatusCode::INTERNAL_SERVER_ERROR]).await;

        let ack = dispatcher(&url, RetryPolicy::none())
            .dispatch(DeployTrigger::manual("master"))
            .await;

        assert!(matches!(
            ack,
            AckResult::Rejected(DispatchError::Refused { status: 500, .. })
        ));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_worker_exhausts_attempts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ack = dispatcher(&format!("http://{addr}"), quick_retries(2))
            .dispatch(DeployTrigger::manual("master"))
            .await;

        assert!(matches!(
            ack,
            AckResult::Rejected(DispatchError::Unreachable { attempts: 2, .. })
        ));
    }
}
