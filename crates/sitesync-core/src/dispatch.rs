//! Trigger -> worker hand-off.
//!
//! The trigger path must answer its caller without waiting on the pipeline,
//! so a dispatcher only *starts* a run. The in-process variant spawns the
//! orchestrator on the runtime; the remote variant lives in the infra crate
//! and forwards the trigger over HTTP.

use std::future::Future;
use std::sync::Arc;

use sitesync_types::error::DispatchError;
use sitesync_types::trigger::DeployTrigger;
use tokio_util::task::TaskTracker;

use crate::pipeline::{Orchestrator, Publisher, SiteBuilder, SourceFetcher};

/// Whether the worker took responsibility for the trigger.
#[derive(Debug)]
pub enum AckResult {
    Accepted,
    Rejected(DispatchError),
}

impl AckResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AckResult::Accepted)
    }
}

/// Hands a validated trigger to whatever executes deployments.
pub trait Dispatcher: Send + Sync {
    /// Start a run for `trigger`. Returns once the hand-off is acknowledged,
    /// never after the run completes.
    fn dispatch(&self, trigger: DeployTrigger) -> impl Future<Output = AckResult> + Send;
}

/// Runs deployments as background tasks of the current process.
///
/// Spawned runs are tracked so shutdown can wait for them instead of
/// abandoning a half-published site.
pub struct InProcessDispatcher<F, B, P> {
    orchestrator: Arc<Orchestrator<F, B, P>>,
    tasks: TaskTracker,
}

impl<F, B, P> InProcessDispatcher<F, B, P>
where
    F: SourceFetcher + 'static,
    B: SiteBuilder + 'static,
    P: Publisher + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<F, B, P>>) -> Self {
        Self {
            orchestrator,
            tasks: TaskTracker::new(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<F, B, P>> {
        &self.orchestrator
    }

    /// Number of runs currently spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting triggers and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!(in_flight = self.tasks.len(), "waiting for deployment runs to finish");
        }
        self.tasks.wait().await;
    }
}

impl<F, B, P> Dispatcher for InProcessDispatcher<F, B, P>
where
    F: SourceFetcher + 'static,
    B: SiteBuilder + 'static,
    P: Publisher + 'static,
{
    async fn dispatch(&self, trigger: DeployTrigger) -> AckResult {
        if self.tasks.is_closed() {
            return AckResult::Rejected(DispatchError::ShuttingDown);
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        self.tasks.spawn(async move {
            orchestrator.run(trigger).await;
        });
        AckResult::Accepted
    }
}
