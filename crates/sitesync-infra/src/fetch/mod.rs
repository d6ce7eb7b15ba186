//! Source fetchers.

pub mod archive;
pub mod git;

use std::path::{Path, PathBuf};

use sitesync_core::pipeline::SourceFetcher;
use sitesync_types::config::Programs;
use sitesync_types::error::FetchError;
use sitesync_types::trigger::DeployTrigger;

pub use archive::ArchiveFetcher;
pub use git::GitFetcher;

use crate::config::{Settings, SourceStrategy};

/// The fetch strategy selected at startup.
pub enum ConfiguredFetcher {
    Archive(ArchiveFetcher),
    Git(GitFetcher),
}

impl ConfiguredFetcher {
    pub fn from_settings(settings: &Settings, programs: &Programs) -> Self {
        match settings.source_strategy {
            SourceStrategy::Archive => ConfiguredFetcher::Archive(ArchiveFetcher::new(
                settings.source.clone(),
                settings.repository.clone(),
                settings.source_token.clone(),
                programs.tar.clone(),
            )),
            SourceStrategy::Git => {
                ConfiguredFetcher::Git(GitFetcher::new(settings.source.clone(), programs.git.clone()))
            }
        }
    }
}

impl SourceFetcher for ConfiguredFetcher {
    async fn fetch(&self, trigger: &DeployTrigger, workspace: &Path) -> Result<PathBuf, FetchError> {
        match self {
            ConfiguredFetcher::Archive(fetcher) => fetcher.fetch(trigger, workspace).await,
            ConfiguredFetcher::Git(fetcher) => fetcher.fetch(trigger, workspace).await,
        }
    }
}
