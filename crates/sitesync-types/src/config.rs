//! Pipeline tuning configuration.
//!
//! `PipelineConfig` represents the optional `sitesync.toml` that controls
//! stage timeouts, the external commands and the dispatch retry policy.
//! Secrets never live here; they come from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level tuning file. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub timeouts: StageTimeouts,

    /// Dependency installer run before the build. Empty disables it.
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    /// Static site generator invocation.
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,

    /// Build output directory, relative to the snapshot.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Where run directories are created (system temp dir when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub programs: Programs,

    #[serde(default)]
    pub dispatch: DispatchRetryConfig,
}

fn default_install_command() -> Vec<String> {
    ["bundle", "install", "--path", "vendor/bundle"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_build_command() -> Vec<String> {
    ["bundle", "exec", "jekyll", "build"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_output_dir() -> String {
    "_site".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            install_command: default_install_command(),
            build_command: default_build_command(),
            output_dir: default_output_dir(),
            scratch_dir: None,
            programs: Programs::default(),
            dispatch: DispatchRetryConfig::default(),
        }
    }
}

/// Upper bound on each stage, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,
    #[serde(default = "default_build_secs")]
    pub build_secs: u64,
    #[serde(default = "default_publish_secs")]
    pub publish_secs: u64,
}

fn default_fetch_secs() -> u64 {
    300
}

fn default_build_secs() -> u64 {
    900
}

fn default_publish_secs() -> u64 {
    600
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            build_secs: default_build_secs(),
            publish_secs: default_publish_secs(),
        }
    }
}

/// Names (or paths) of the external programs the pipeline shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Programs {
    #[serde(default = "default_git")]
    pub git: String,
    #[serde(default = "default_tar")]
    pub tar: String,
    #[serde(default = "default_rsync")]
    pub rsync: String,
    #[serde(default = "default_ssh")]
    pub ssh: String,
}

fn default_git() -> String {
    "git".to_string()
}

fn default_tar() -> String {
    "tar".to_string()
}

fn default_rsync() -> String {
    "rsync".to_string()
}

fn default_ssh() -> String {
    "ssh".to_string()
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            git: default_git(),
            tar: default_tar(),
            rsync: default_rsync(),
            ssh: default_ssh(),
        }
    }
}

/// Retry policy for forwarding a trigger to a remote worker.
///
/// The default is a single attempt: a failed hand-off is reported to the
/// caller, whose next notification starts a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-attempt request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl Default for DispatchRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
