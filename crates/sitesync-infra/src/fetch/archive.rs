//! Snapshot via tarball download.
//!
//! The archive is streamed into a temporary file inside the run workspace,
//! extracted with `tar`, and then removed. Forge-generated archives wrap the
//! tree in a single `<name>-<ref>/` directory; that directory is the snapshot.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use sitesync_core::pipeline::SourceFetcher;
use sitesync_types::error::FetchError;
use sitesync_types::trigger::{DeployTrigger, TriggerSource};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::command;

/// Name of the extraction directory inside the run workspace.
const EXTRACT_DIR: &str = "source";

pub struct ArchiveFetcher {
    http: reqwest::Client,
    /// URL with `{repository}` and `{branch}` placeholders.
    url_template: String,
    repository: Option<String>,
    token: Option<SecretString>,
    tar: String,
}

impl ArchiveFetcher {
    pub fn new(
        url_template: impl Into<String>,
        repository: Option<String>,
        token: Option<SecretString>,
        tar: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sitesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http,
            url_template: url_template.into(),
            repository,
            token,
            tar: tar.into(),
        }
    }

    /// The archive URL for `trigger`.
    ///
    /// The configured repository wins; a push trigger's repository is used
    /// only when none is configured.
    pub fn archive_url(&self, trigger: &DeployTrigger) -> String {
        let pushed = match &trigger.source {
            TriggerSource::Push { repository, .. } => repository.as_deref(),
            TriggerSource::Manual => None,
        };
        let repository = self.repository.as_deref().or(pushed).unwrap_or_default();
        self.url_template
            .replace("{repository}", repository)
            .replace("{branch}", &trigger.branch)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        };

        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::io("create archive file", e))?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io("write archive file", e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::io("write archive file", e))?;
        Ok(written)
    }

    async fn extract(&self, archive: &Path, workspace: &Path) -> Result<PathBuf, FetchError> {
        let dest = workspace.join(EXTRACT_DIR);
        tokio::fs::create_dir(&dest)
            .await
            .map_err(|e| FetchError::io("create extraction directory", e))?;

        command::run(
            Command::new(&self.tar)
                .arg("-xzf")
                .arg(archive)
                .arg("-C")
                .arg(&dest),
        )
        .await?;

        single_top_level_dir(&dest).await
    }
}

impl SourceFetcher for ArchiveFetcher {
    async fn fetch(&self, trigger: &DeployTrigger, workspace: &Path) -> Result<PathBuf, FetchError> {
        let url = self.archive_url(trigger);

        // Removed on drop, so every early return below cleans it up too.
        let archive = tempfile::Builder::new()
            .prefix("source-")
            .suffix(".tar.gz")
            .tempfile_in(workspace)
            .map_err(|e| FetchError::io("create archive file", e))?;

        tracing::info!(url = %url, "downloading source archive");
        let bytes = self.download(&url, archive.path()).await?;
        tracing::debug!(bytes, "downloaded source archive");

        let snapshot = self.extract(archive.path(), workspace).await?;
        archive
            .close()
            .map_err(|e| FetchError::io("remove archive file", e))?;

        tracing::info!(snapshot = %snapshot.display(), "extracted source snapshot");
        Ok(snapshot)
    }
}

/// The one directory directly under `dir`, or `UnexpectedLayout`.
async fn single_top_level_dir(dir: &Path) -> Result<PathBuf, FetchError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FetchError::io("read extracted archive", e))?;

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FetchError::io("read extracted archive", e))?
    {
        found.push(entry);
    }

    match found.as_slice() {
        [only] => {
            let is_dir = only
                .file_type()
                .await
                .map_err(|e| FetchError::io("read extracted archive", e))?
                .is_dir();
            if is_dir {
                Ok(only.path())
            } else {
                Err(FetchError::UnexpectedLayout(format!(
                    "top-level entry {} is not a directory",
                    only.file_name().to_string_lossy()
                )))
            }
        }
        [] => Err(FetchError::UnexpectedLayout("archive is empty".to_string())),
        many => Err(FetchError::UnexpectedLayout(format!(
            "expected one top-level directory, found {} entries",
            many.len()
        ))),
    }
}
