//! Application state wiring the pipeline together.
//!
//! The core services are generic over their ports; this module pins them to
//! the concrete infra implementations selected by configuration.

use std::sync::Arc;

use sitesync_core::auth::Authenticator;
use sitesync_core::dispatch::{AckResult, Dispatcher, InProcessDispatcher};
use sitesync_core::filter::EventFilter;
use sitesync_core::pipeline::{Orchestrator, RemoteTarget, StageTimeouts};
use sitesync_core::trigger::TriggerService;
use sitesync_infra::build::CommandSiteBuilder;
use sitesync_infra::config::Settings;
use sitesync_infra::dispatch::RemoteWorkerDispatcher;
use sitesync_infra::fetch::ConfiguredFetcher;
use sitesync_infra::publish::RsyncPublisher;
use sitesync_types::config::PipelineConfig;
use sitesync_types::trigger::DeployTrigger;

/// Concrete type aliases for the pipeline generics pinned to infra implementations.
pub type ConcreteOrchestrator = Orchestrator<ConfiguredFetcher, CommandSiteBuilder, RsyncPublisher>;

pub type LocalDispatcher = InProcessDispatcher<ConfiguredFetcher, CommandSiteBuilder, RsyncPublisher>;

/// Build the orchestrator described by `settings` and `config`.
pub fn build_orchestrator(settings: &Settings, config: &PipelineConfig) -> ConcreteOrchestrator {
    let scratch_root = config
        .scratch_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    Orchestrator::new(
        ConfiguredFetcher::from_settings(settings, &config.programs),
        CommandSiteBuilder::from_config(config),
        RsyncPublisher::new(settings.ssh_key.clone(), &config.programs),
        RemoteTarget::new(settings.publish_target.clone()),
        scratch_root,
    )
    .with_timeouts(StageTimeouts::from(&config.timeouts))
}

/// Where accepted triggers go.
pub enum ConfiguredDispatcher {
    /// Run the pipeline in this process.
    InProcess(LocalDispatcher),
    /// Forward to a worker process.
    Remote(RemoteWorkerDispatcher),
}

impl ConfiguredDispatcher {
    /// Stop accepting work and wait for in-process runs to finish.
    pub async fn shutdown(&self) {
        if let ConfiguredDispatcher::InProcess(dispatcher) = self {
            dispatcher.shutdown().await;
        }
    }
}

impl Dispatcher for ConfiguredDispatcher {
    async fn dispatch(&self, trigger: DeployTrigger) -> AckResult {
        match self {
            ConfiguredDispatcher::InProcess(dispatcher) => dispatcher.dispatch(trigger).await,
            ConfiguredDispatcher::Remote(dispatcher) => dispatcher.dispatch(trigger).await,
        }
    }
}

/// Shared application state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<TriggerService<ConfiguredDispatcher>>,
}

impl AppState {
    /// State for `sitesync serve`: dispatch in-process, or to the worker
    /// named by `SITESYNC_WORKER_URL`.
    pub fn for_trigger(settings: &Settings, config: &PipelineConfig) -> Self {
        let dispatcher = match &settings.worker_url {
            Some(url) => {
                let remote = RemoteWorkerDispatcher::from_config(
                    url,
                    settings.override_key.clone(),
                    &config.dispatch,
                );
                tracing::info!(endpoint = %remote.endpoint(), "forwarding deployments to worker");
                ConfiguredDispatcher::Remote(remote)
            }
            None => ConfiguredDispatcher::InProcess(local_dispatcher(settings, config)),
        };
        Self::with_dispatcher(settings, dispatcher)
    }

    /// State for `sitesync worker`: always runs the pipeline locally.
    pub fn for_worker(settings: &Settings, config: &PipelineConfig) -> Self {
        Self::with_dispatcher(
            settings,
            ConfiguredDispatcher::InProcess(local_dispatcher(settings, config)),
        )
    }

    fn with_dispatcher(settings: &Settings, dispatcher: ConfiguredDispatcher) -> Self {
        let authenticator = Authenticator::new(
            settings.webhook_secret.clone(),
            settings.override_key.clone(),
        );
        let filter = EventFilter::new(settings.branch.clone(), settings.repository.clone());
        Self {
            trigger: Arc::new(TriggerService::new(authenticator, filter, dispatcher)),
        }
    }

    pub async fn shutdown(&self) {
        self.trigger.dispatcher().shutdown().await;
    }
}

fn local_dispatcher(settings: &Settings, config: &PipelineConfig) -> LocalDispatcher {
    InProcessDispatcher::new(Arc::new(build_orchestrator(settings, config)))
}
