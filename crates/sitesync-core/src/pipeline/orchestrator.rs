//! Deployment orchestrator: sequences Fetch -> Build -> Publish.
//!
//! # Run lifecycle
//!
//! 1. Try the deployment lock. If another run holds it, report `Busy` and stop.
//! 2. Create a run-owned scratch workspace.
//! 3. Fetch, Build, Publish in strict order, each bounded by a timeout.
//!    The first failure ends the run as `Failed(stage)`.
//! 4. Remove the workspace and release the lock, whatever happened.
//!
//! There is no retry here. A failed run stays failed; the next trigger starts
//! from scratch.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use sitesync_types::config;
use sitesync_types::error::PipelineError;
use sitesync_types::run::{RunOutcome, RunReport, RunState, Stage};
use sitesync_types::trigger::DeployTrigger;
use tracing::Instrument;
use uuid::Uuid;

use super::{DeploymentLock, Publisher, RemoteTarget, RunWorkspace, SiteBuilder, SourceFetcher};

/// Upper bound on each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub build: Duration,
    pub publish: Duration,
}

impl StageTimeouts {
    fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Fetching => self.fetch,
            Stage::Building => self.build,
            Stage::Publishing => self.publish,
        }
    }
}

impl From<&config::StageTimeouts> for StageTimeouts {
    fn from(config: &config::StageTimeouts) -> Self {
        Self {
            fetch: Duration::from_secs(config.fetch_secs),
            build: Duration::from_secs(config.build_secs),
            publish: Duration::from_secs(config.publish_secs),
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::from(&config::StageTimeouts::default())
    }
}

/// Runs deployments one at a time.
///
/// Generic over the three pipeline ports so tests can substitute fakes.
pub struct Orchestrator<F, B, P> {
    fetcher: F,
    builder: B,
    publisher: P,
    target: RemoteTarget,
    scratch_root: PathBuf,
    timeouts: StageTimeouts,
    lock: DeploymentLock,
}

impl<F, B, P> Orchestrator<F, B, P>
where
    F: SourceFetcher,
    B: SiteBuilder,
    P: Publisher,
{
    pub fn new(
        fetcher: F,
        builder: B,
        publisher: P,
        target: RemoteTarget,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            builder,
            publisher,
            target,
            scratch_root,
            timeouts: StageTimeouts::default(),
            lock: DeploymentLock::new(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share a lock with other orchestrators in the same process.
    pub fn with_lock(mut self, lock: DeploymentLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &DeploymentLock {
        &self.lock
    }

    /// Execute one deployment run to completion and report how it ended.
    pub async fn run(&self, trigger: DeployTrigger) -> RunReport {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();

        let Some(_guard) = self.lock.try_acquire() else {
            let report = RunReport {
                run_id,
                trigger,
                outcome: RunOutcome::Busy,
                completed_stages: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            };
            log_report(&report);
            return report;
        };

        let span = tracing::info_span!(
            "deployment_run",
            run_id = %run_id,
            trigger = trigger.kind(),
            branch = %trigger.branch,
        );

        let mut completed_stages = Vec::new();
        let result = self
            .execute(run_id, &trigger, &mut completed_stages)
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(()) => RunOutcome::Succeeded,
            Err(err) => RunOutcome::Failed {
                stage: err.stage(),
                cause: err.to_string(),
            },
        };
        let report = RunReport {
            run_id,
            trigger,
            outcome,
            completed_stages,
            started_at,
            finished_at: Utc::now(),
        };
        log_report(&report);
        report
    }

    async fn execute(
        &self,
        run_id: Uuid,
        trigger: &DeployTrigger,
        completed: &mut Vec<Stage>,
    ) -> Result<(), PipelineError> {
        let workspace = RunWorkspace::create_off_runtime(self.scratch_root.clone(), run_id)
            .await
            .map_err(PipelineError::Workspace)?;
        tracing::debug!(workspace = %workspace.path().display(), "created run workspace");

        let result = self.run_stages(trigger, &workspace, completed).await;

        // Closing explicitly surfaces removal failures in the logs. A
        // cancelled run still removes the workspace when it is dropped.
        match workspace.close_off_runtime().await {
            Ok(path) => tracing::debug!(workspace = %path.display(), "removed run workspace"),
            Err(e) => tracing::warn!(error = %e, "failed to remove run workspace"),
        }
        result
    }

    async fn run_stages(
        &self,
        trigger: &DeployTrigger,
        workspace: &RunWorkspace,
        completed: &mut Vec<Stage>,
    ) -> Result<(), PipelineError> {
        let snapshot = self
            .stage(Stage::Fetching, self.fetcher.fetch(trigger, workspace.path()))
            .await?;
        completed.push(Stage::Fetching);

        let artifact = self
            .stage(Stage::Building, self.builder.build(&snapshot))
            .await?;
        completed.push(Stage::Building);

        self.stage(Stage::Publishing, self.publisher.publish(&artifact, &self.target))
            .await?;
        completed.push(Stage::Publishing);

        Ok(())
    }

    /// Run one stage under its timeout.
    async fn stage<T, E>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PipelineError>
    where
        PipelineError: From<E>,
    {
        let limit = self.timeouts.for_stage(stage);
        tracing::info!(state = ?RunState::Running(stage), "entering {stage}");

        match tokio::time::timeout(limit, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PipelineError::from(e)),
            Err(_) => Err(PipelineError::TimedOut { stage, after: limit }),
        }
    }
}

/// Emit the end-of-run record. Failures carry the external tool's output.
fn log_report(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Succeeded => tracing::info!(
            run_id = %report.run_id,
            trigger = report.trigger.kind(),
            duration_ms = report.duration_ms(),
            "deployment succeeded"
        ),
        RunOutcome::Failed { stage, cause } => tracing::error!(
            run_id = %report.run_id,
            trigger = report.trigger.kind(),
            stage = %stage,
            duration_ms = report.duration_ms(),
            "deployment failed: {cause}"
        ),
        RunOutcome::Busy => tracing::info!(
            run_id = %report.run_id,
            trigger = report.trigger.kind(),
            "deployment already in progress; trigger superseded"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use sitesync_types::error::{BuildError, CommandError, FetchError, PublishError};
    use tokio::sync::{oneshot, Notify};

    // -------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------

    /// Writes `pages` into `<workspace>/source` and records the workspace.
    #[derive(Default)]
    struct DirFetcher {
        pages: Arc<Mutex<BTreeMap<String, String>>>,
        workspaces: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl SourceFetcher for DirFetcher {
        async fn fetch(
            &self,
            _trigger: &DeployTrigger,
            workspace: &Path,
        ) -> Result<PathBuf, FetchError> {
            self.workspaces.lock().unwrap().push(workspace.to_path_buf());
            let snapshot = workspace.join("source");
            std::fs::create_dir_all(&snapshot).map_err(|e| FetchError::io("mkdir", e))?;
            for (name, content) in self.pages.lock().unwrap().iter() {
                std::fs::write(snapshot.join(name), content)
                    .map_err(|e| FetchError::io("write", e))?;
            }
            Ok(snapshot)
        }
    }

    /// Blocks until released, signalling once it has started.
    struct GatedFetcher {
        entered: Mutex<Option<oneshot::Sender<()>>>,
        release: Arc<Notify>,
        inner: DirFetcher,
    }

    impl SourceFetcher for GatedFetcher {
        async fn fetch(
            &self,
            trigger: &DeployTrigger,
            workspace: &Path,
        ) -> Result<PathBuf, FetchError> {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                let _ = tx.send(());
            }
            self.release.notified().await;
            self.inner.fetch(trigger, workspace).await
        }
    }

    /// Never completes.
    #[derive(Default)]
    struct HangingFetcher {
        workspaces: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl SourceFetcher for HangingFetcher {
        async fn fetch(
            &self,
            _trigger: &DeployTrigger,
            workspace: &Path,
        ) -> Result<PathBuf, FetchError> {
            self.workspaces.lock().unwrap().push(workspace.to_path_buf());
            std::future::pending().await
        }
    }

    /// Copies every snapshot file into `<snapshot>/_site`, or fails like a
    /// template error would.
    #[derive(Default)]
    struct CopyBuilder {
        fail: bool,
    }

    impl SiteBuilder for CopyBuilder {
        async fn build(&self, snapshot: &Path) -> Result<PathBuf, BuildError> {
            if self.fail {
                return Err(BuildError::Command(CommandError::Exited {
                    program: "bundle".to_string(),
                    status: Some(1),
                    output: "Liquid Exception: Unknown tag 'foo' in index.md".to_string(),
                }));
            }
            let site = snapshot.join("_site");
            std::fs::create_dir_all(&site).unwrap();
            for entry in std::fs::read_dir(snapshot).unwrap() {
                let entry = entry.unwrap();
                if entry.file_type().unwrap().is_file() {
                    std::fs::copy(entry.path(), site.join(entry.file_name())).unwrap();
                }
            }
            Ok(site)
        }
    }

    /// Mirrors a flat artifact into a local "remote" directory, tracking
    /// how many publishes overlap.
    struct MirrorPublisher {
        remote: PathBuf,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl MirrorPublisher {
        fn new(remote: PathBuf) -> Self {
            std::fs::create_dir_all(&remote).unwrap();
            Self {
                remote,
                active: Arc::default(),
                max_active: Arc::default(),
                calls: Arc::default(),
            }
        }
    }

    impl Publisher for MirrorPublisher {
        async fn publish(&self, artifact: &Path, _target: &RemoteTarget) -> Result<(), PublishError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            for entry in std::fs::read_dir(&self.remote).unwrap() {
                let entry = entry.unwrap();
                if !artifact.join(entry.file_name()).exists() {
                    std::fs::remove_file(entry.path()).unwrap();
                }
            }
            for entry in std::fs::read_dir(artifact).unwrap() {
                let entry = entry.unwrap();
                std::fs::copy(entry.path(), self.remote.join(entry.file_name())).unwrap();
            }

            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn remote_state(remote: &Path) -> BTreeMap<String, String> {
        std::fs::read_dir(remote)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    std::fs::read_to_string(e.path()).unwrap(),
                )
            })
            .collect()
    }

    fn pages(entries: &[(&str, &str)]) -> Arc<Mutex<BTreeMap<String, String>>> {
        Arc::new(Mutex::new(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    fn target() -> RemoteTarget {
        RemoteTarget::new("wics@example.org:~/public_html")
    }

    // -------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_successful_run_publishes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirFetcher {
            pages: pages(&[("index.html", "<h1>WICS</h1>"), ("about.html", "about")]),
            ..Default::default()
        };
        let workspaces = Arc::clone(&fetcher.workspaces);
        let publisher = MirrorPublisher::new(dir.path().join("remote"));
        let orchestrator = Orchestrator::new(
            fetcher,
            CopyBuilder::default(),
            publisher,
            target(),
            dir.path().join("scratch"),
        );

        let report = orchestrator.run(DeployTrigger::manual("master")).await;

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(
            report.completed_stages,
            vec![Stage::Fetching, Stage::Building, Stage::Publishing]
        );
        let remote = remote_state(&dir.path().join("remote"));
        assert_eq!(remote.get("index.html").map(String::as_str), Some("<h1>WICS</h1>"));
        assert_eq!(remote.len(), 2);

        // Cleanup guarantee.
        for ws in workspaces.lock().unwrap().iter() {
            assert!(!ws.exists(), "workspace {} leaked", ws.display());
        }
        assert!(!orchestrator.lock().is_held());
    }

    #[tokio::test]
    async fn test_build_failure_skips_publish_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let publisher = MirrorPublisher::new(remote_dir.clone());
        std::fs::write(remote_dir.join("index.html"), "previous build").unwrap();
        let calls = Arc::clone(&publisher.calls);

        let fetcher = DirFetcher {
            pages: pages(&[("index.html", "new")]),
            ..Default::default()
        };
        let workspaces = Arc::clone(&fetcher.workspaces);
        let orchestrator = Orchestrator::new(
            fetcher,
            CopyBuilder { fail: true },
            publisher,
            target(),
            dir.path().join("scratch"),
        );

        let report = orchestrator.run(DeployTrigger::manual("master")).await;

        let RunOutcome::Failed { stage, cause } = &report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(*stage, Stage::Building);
        assert!(cause.contains("Liquid Exception: Unknown tag 'foo' in index.md"));
        assert_eq!(report.completed_stages, vec![Stage::Fetching]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Remote untouched, storage removed, lock free.
        assert_eq!(
            std::fs::read_to_string(remote_dir.join("index.html")).unwrap(),
            "previous build"
        );
        let workspaces = workspaces.lock().unwrap();
        assert_eq!(workspaces.len(), 1);
        assert!(!workspaces[0].exists());
        assert!(!orchestrator.lock().is_held());
        assert_eq!(std::fs::read_dir(dir.path().join("scratch")).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_fails_run_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HangingFetcher::default();
        let workspaces = Arc::clone(&fetcher.workspaces);
        let orchestrator = Orchestrator::new(
            fetcher,
            CopyBuilder::default(),
            MirrorPublisher::new(dir.path().join("remote")),
            target(),
            dir.path().join("scratch"),
        )
        .with_timeouts(StageTimeouts {
            fetch: Duration::from_secs(5),
            build: Duration::from_secs(5),
            publish: Duration::from_secs(5),
        });

        let report = orchestrator.run(DeployTrigger::manual("master")).await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                stage: Stage::Fetching,
                cause: "fetching timed out after 5s".to_string(),
            }
        );
        assert!(report.completed_stages.is_empty());
        assert!(!workspaces.lock().unwrap()[0].exists());
        assert!(!orchestrator.lock().is_held());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected_busy() {
        let dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = oneshot::channel();
        let release = Arc::new(Notify::new());
        let fetcher = GatedFetcher {
            entered: Mutex::new(Some(entered_tx)),
            release: Arc::clone(&release),
            inner: DirFetcher {
                pages: pages(&[("index.html", "one")]),
                ..Default::default()
            },
        };
        let publisher = MirrorPublisher::new(dir.path().join("remote"));
        let max_active = Arc::clone(&publisher.max_active);
        let calls = Arc::clone(&publisher.calls);
        let orchestrator = Arc::new(Orchestrator::new(
            fetcher,
            CopyBuilder::default(),
            publisher,
            target(),
            dir.path().join("scratch"),
        ));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run(DeployTrigger::manual("master")).await })
        };
        entered_rx.await.unwrap();
        assert!(orchestrator.lock().is_held());

        let second = orchestrator.run(DeployTrigger::manual("master")).await;
        assert_eq!(second.outcome, RunOutcome::Busy);
        assert!(second.completed_stages.is_empty());

        release.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.outcome, RunOutcome::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.lock().is_held());
    }

    #[tokio::test]
    async fn test_repeated_runs_leave_identical_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let publisher = MirrorPublisher::new(remote_dir.clone());
        std::fs::write(remote_dir.join("stale.html"), "from an older build").unwrap();

        let orchestrator = Orchestrator::new(
            DirFetcher {
                pages: pages(&[("index.html", "home"), ("feed.xml", "<rss/>")]),
                ..Default::default()
            },
            CopyBuilder::default(),
            publisher,
            target(),
            dir.path().join("scratch"),
        );

        let first = orchestrator.run(DeployTrigger::manual("master")).await;
        let after_first = remote_state(&remote_dir);
        let second = orchestrator.run(DeployTrigger::manual("master")).await;
        let after_second = remote_state(&remote_dir);

        assert!(first.outcome.is_success());
        assert!(second.outcome.is_success());
        assert_eq!(after_first, after_second);
        assert!(!after_second.contains_key("stale.html"));
        assert_eq!(after_second.len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_scratch_root_fails_in_fetching() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the scratch directory should be.
        let blocked = dir.path().join("scratch");
        std::fs::write(&blocked, "not a directory").unwrap();

        let orchestrator = Orchestrator::new(
            DirFetcher::default(),
            CopyBuilder::default(),
            MirrorPublisher::new(dir.path().join("remote")),
            target(),
            blocked,
        );

        let report = orchestrator.run(DeployTrigger::manual("master")).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Failed {
                stage: Stage::Fetching,
                ..
            }
        ));
        assert!(!orchestrator.lock().is_held());
    }

    #[test]
    fn test_stage_timeouts_from_config() {
        let timeouts = StageTimeouts::from(&config::StageTimeouts {
            fetch_secs: 1,
            build_secs: 2,
            publish_secs: 3,
        });
        assert_eq!(timeouts.for_stage(Stage::Fetching), Duration::from_secs(1));
        assert_eq!(timeouts.for_stage(Stage::Building), Duration::from_secs(2));
        assert_eq!(timeouts.for_stage(Stage::Publishing), Duration::from_secs(3));
    }
}
