//! Snapshot via shallow clone.

use std::path::{Path, PathBuf};

use sitesync_core::pipeline::SourceFetcher;
use sitesync_types::error::FetchError;
use sitesync_types::trigger::DeployTrigger;
use tokio::process::Command;

use crate::command;

/// Name of the clone directory inside the run workspace.
const CLONE_DIR: &str = "source";

/// Clones the tip of the trigger's branch with `--depth 1`.
///
/// Prompting is disabled; a remote that needs interactive credentials fails
/// the fetch instead of hanging it.
pub struct GitFetcher {
    remote_url: String,
    git: String,
}

impl GitFetcher {
    pub fn new(remote_url: impl Into<String>, git: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            git: git.into(),
        }
    }

    fn clone_command(&self, branch: &str, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.args(["clone", "--depth", "1", "--single-branch", "--branch"])
            .arg(branch)
            .arg("--")
            .arg(&self.remote_url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }
}

impl SourceFetcher for GitFetcher {
    async fn fetch(&self, trigger: &DeployTrigger, workspace: &Path) -> Result<PathBuf, FetchError> {
        let dest = workspace.join(CLONE_DIR);
        tracing::info!(remote = %self.remote_url, branch = %trigger.branch, "cloning source");

        let output = command::run(&mut self.clone_command(&trigger.branch, &dest)).await?;
        if !output.is_empty() {
            tracing::debug!(output = %output, "git clone output");
        }
        Ok(dest)
    }
}
