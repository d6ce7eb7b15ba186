use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::run::Stage;

/// Boxed cause for failures whose concrete error type lives in another crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a request was not authenticated.
///
/// Always a rejection; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("bad override credential")]
    BadOverrideCredential,

    #[error("missing signature")]
    MissingSignature,

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("malformed signature")]
    MalformedSignature,

    #[error("incorrect signature")]
    IncorrectSignature,
}

/// Failure of an external command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully. `output` is the combined
    /// stdout/stderr, kept verbatim for operators.
    #[error("`{program}` exited with {}:\n{output}", describe_status(.status))]
    Exited {
        program: String,
        status: Option<i32>,
        output: String,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

impl CommandError {
    /// Captured diagnostic output, if the command got far enough to produce any.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Exited { output, .. } => Some(output),
            CommandError::Spawn { .. } => None,
        }
    }
}

/// Errors from obtaining a source snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected archive layout: {0}")]
    UnexpectedLayout(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl FetchError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FetchError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors from the static site build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("build finished but produced no output directory at {0}")]
    MissingArtifact(PathBuf),
}

/// Errors from mirroring the artifact to the remote host.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport credentials at {path} are unusable: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact directory {0} does not exist")]
    MissingArtifact(PathBuf),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Why a run ended in `Failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not prepare run workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("{stage} timed out after {}s", .after.as_secs())]
    TimedOut { stage: Stage, after: Duration },
}

impl PipelineError {
    /// The stage the run failed in.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Workspace(_) | PipelineError::Fetch(_) => Stage::Fetching,
            PipelineError::Build(_) => Stage::Building,
            PipelineError::Publish(_) => Stage::Publishing,
            PipelineError::TimedOut { stage, .. } => *stage,
        }
    }
}

/// Failure to hand a validated trigger to the worker.
///
/// The only pipeline-side failure reported back to the trigger's caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker unreachable after {attempts} attempt(s): {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("worker refused the run with status {status}: {body}")]
    Refused { status: u16, body: String },

    #[error("worker runtime is shutting down")]
    ShuttingDown,
}
