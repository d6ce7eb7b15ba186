//! Configuration loading for sitesync.
//!
//! Two sources:
//! - the environment, for everything required to run at all (secrets, the
//!   publish target, the source location). A missing value refuses startup.
//! - an optional TOML tuning file ([`PipelineConfig`]), for everything that
//!   has a sensible default. A missing or malformed file falls back to
//!   defaults with a warning.
//!
//! Both are read once at startup and passed down as immutable values.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;
use sitesync_types::config::PipelineConfig;

pub const WEBHOOK_SECRET_VAR: &str = "SITESYNC_WEBHOOK_SECRET";
pub const OVERRIDE_KEY_VAR: &str = "SITESYNC_OVERRIDE_KEY";
pub const PUBLISH_TARGET_VAR: &str = "SITESYNC_PUBLISH_TARGET";
pub const SSH_KEY_VAR: &str = "SITESYNC_SSH_KEY";
pub const SOURCE_VAR: &str = "SITESYNC_SOURCE";
pub const SOURCE_STRATEGY_VAR: &str = "SITESYNC_SOURCE_STRATEGY";
pub const REPOSITORY_VAR: &str = "SITESYNC_REPOSITORY";
pub const BRANCH_VAR: &str = "SITESYNC_BRANCH";
pub const SOURCE_TOKEN_VAR: &str = "SITESYNC_SOURCE_TOKEN";
pub const WORKER_URL_VAR: &str = "SITESYNC_WORKER_URL";
pub const CONFIG_PATH_VAR: &str = "SITESYNC_CONFIG";

/// Branch deployed when none is configured.
pub const DEFAULT_BRANCH: &str = "master";

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("ssh key {path} is not usable: {source}")]
    SshKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read tuning file {path}: {source}")]
    TuningFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tuning file {path}: {source}")]
    TuningFileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How the source snapshot is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceStrategy {
    /// Download and extract a tarball from a URL template.
    #[default]
    Archive,
    /// Shallow single-branch clone.
    Git,
}

impl FromStr for SourceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "archive" => Ok(SourceStrategy::Archive),
            "git" => Ok(SourceStrategy::Git),
            other => Err(format!("unknown source strategy '{other}' (expected 'archive' or 'git')")),
        }
    }
}

/// Required and optional environment settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub webhook_secret: SecretString,
    pub override_key: SecretString,
    /// `user@host:path` handed to rsync.
    pub publish_target: String,
    pub ssh_key: PathBuf,
    /// Archive URL template or git remote URL, depending on `source_strategy`.
    pub source: String,
    pub source_strategy: SourceStrategy,
    /// `owner/name`; when set, pushes from other repositories are ignored.
    pub repository: Option<String>,
    /// Branch deployed by manual triggers.
    pub branch: String,
    pub source_token: Option<SecretString>,
    /// Base URL of a separate worker process. In-process dispatch when unset.
    pub worker_url: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let source_strategy = match optional(SOURCE_STRATEGY_VAR) {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: SOURCE_STRATEGY_VAR,
                reason,
            })?,
            None => SourceStrategy::default(),
        };

        let settings = Self {
            webhook_secret: SecretString::from(required(WEBHOOK_SECRET_VAR)?),
            override_key: SecretString::from(required(OVERRIDE_KEY_VAR)?),
            publish_target: required(PUBLISH_TARGET_VAR)?,
            ssh_key: PathBuf::from(required(SSH_KEY_VAR)?),
            source: required(SOURCE_VAR)?,
            source_strategy,
            repository: optional(REPOSITORY_VAR),
            branch: optional(BRANCH_VAR).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            source_token: optional(SOURCE_TOKEN_VAR).map(SecretString::from),
            worker_url: optional(WORKER_URL_VAR),
            config_path: optional(CONFIG_PATH_VAR).map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.source_strategy == SourceStrategy::Archive
            && self.source.contains("{repository}")
            && self.repository.is_none()
        {
            return Err(ConfigError::Invalid {
                var: REPOSITORY_VAR,
                reason: format!("required because {SOURCE_VAR} contains {{repository}}"),
            });
        }
        if let Some(url) = &self.worker_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: WORKER_URL_VAR,
                    reason: format!("'{url}' is not an http(s) URL"),
                });
            }
        }
        Ok(())
    }

    /// Fail fast when the transport key cannot be used.
    pub fn check_ssh_key(&self) -> Result<(), ConfigError> {
        std::fs::File::open(&self.ssh_key)
            .map(|_| ())
            .map_err(|source| ConfigError::SshKey {
                path: self.ssh_key.clone(),
                source,
            })
    }
}

/// Load the tuning file at `path`.
///
/// The file was named explicitly through `SITESYNC_CONFIG`, so a missing,
/// unreadable or invalid file stops startup instead of silently falling
/// back to the defaults.
pub async fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::TuningFileRead {
            path: path.to_path_buf(),
            source,
        })?;

    let config = toml::from_str::<PipelineConfig>(&content).map_err(|source| {
        ConfigError::TuningFileParse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::debug!("Loaded tuning file {}", path.display());
    Ok(config)
}

/// Load the tuning file named by the settings, or defaults when none is set.
pub async fn resolve_pipeline_config(settings: &Settings) -> Result<PipelineConfig, ConfigError> {
    match &settings.config_path {
        Some(path) => load_pipeline_config(path).await,
        None => {
            tracing::debug!("No {CONFIG_PATH_VAR} set, using default tuning");
            Ok(PipelineConfig::default())
        }
    }
}
