//! The Fetch -> Build -> Publish deployment pipeline.
//!
//! This module defines the "ports" the infrastructure layer implements
//! (`SourceFetcher`, `SiteBuilder`, `Publisher`) and the orchestrator that
//! sequences them under the process-wide deployment lock.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

pub mod lock;
pub mod orchestrator;
pub mod workspace;

use std::path::{Path, PathBuf};

use sitesync_types::error::{BuildError, FetchError, PublishError};
use sitesync_types::trigger::DeployTrigger;

pub use lock::{DeploymentGuard, DeploymentLock};
pub use orchestrator::{Orchestrator, StageTimeouts};
pub use workspace::RunWorkspace;

/// Obtains a deployable snapshot of the source repository.
pub trait SourceFetcher: Send + Sync {
    /// Fetch the tip of `trigger.branch` into `workspace` and return the
    /// snapshot root. Intermediate downloads must be gone when this returns.
    fn fetch(
        &self,
        trigger: &DeployTrigger,
        workspace: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, FetchError>> + Send;
}

/// Runs the static site generator against a snapshot.
pub trait SiteBuilder: Send + Sync {
    /// Build the site and return the artifact directory inside `snapshot`.
    fn build(
        &self,
        snapshot: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, BuildError>> + Send;
}

/// Mirrors a built artifact to the remote host.
pub trait Publisher: Send + Sync {
    /// Make `target`'s contents exactly equal to `artifact`'s contents.
    fn publish(
        &self,
        artifact: &Path,
        target: &RemoteTarget,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send;
}

/// Remote publish destination, e.g. `wics@aviary.cs.umanitoba.ca:~/public_html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget(String);

impl RemoteTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
