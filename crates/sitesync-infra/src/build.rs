//! Static site build via external commands.

use std::path::{Path, PathBuf};

use sitesync_core::pipeline::SiteBuilder;
use sitesync_types::config::PipelineConfig;
use sitesync_types::error::BuildError;
use tokio::process::Command;

use crate::command;

/// Runs the install command (if any), then the build command, inside the
/// snapshot directory.
///
/// An empty build command publishes `<snapshot>/<output_dir>` as it is,
/// for repositories that commit their built output.
#[derive(Debug, Clone)]
pub struct CommandSiteBuilder {
    install_command: Vec<String>,
    build_command: Vec<String>,
    output_dir: String,
}

impl CommandSiteBuilder {
    pub fn new(install_command: Vec<String>, build_command: Vec<String>, output_dir: impl Into<String>) -> Self {
        Self {
            install_command,
            build_command,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.install_command.clone(),
            config.build_command.clone(),
            config.output_dir.clone(),
        )
    }

    async fn run_step(step: &str, argv: &[String], snapshot: &Path) -> Result<(), BuildError> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        tracing::info!(step, command = %argv.join(" "), "running build step");
        let output = command::run(Command::new(program).args(args).current_dir(snapshot)).await?;
        if !output.is_empty() {
            tracing::debug!(step, output = %output, "build step output");
        }
        Ok(())
    }
}

impl SiteBuilder for CommandSiteBuilder {
    async fn build(&self, snapshot: &Path) -> Result<PathBuf, BuildError> {
        Self::run_step("install", &self.install_command, snapshot).await?;
        Self::run_step("build", &self.build_command, snapshot).await?;

        let artifact = snapshot.join(&self.output_dir);
        match tokio::fs::metadata(&artifact).await {
            Ok(meta) if meta.is_dir() => Ok(artifact),
            _ => Err(BuildError::MissingArtifact(artifact)),
        }
    }
}
