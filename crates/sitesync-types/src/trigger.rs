//! Validated deploy triggers handed from the trigger to the worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSource {
    /// A signed push to the repository's default branch.
    Push {
        repository: Option<String>,
        head_commit: Option<String>,
        delivery_id: Option<String>,
    },
    /// An operator-initiated redeploy authorized by the override credential.
    Manual,
}

/// A request that passed authentication and filtering.
///
/// This is the only thing that crosses from the trigger to the worker, so it
/// is serializable for the remote hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTrigger {
    pub source: TriggerSource,
    /// Branch whose tip is fetched and published.
    pub branch: String,
    pub received_at: DateTime<Utc>,
}

impl DeployTrigger {
    pub fn push(
        branch: impl Into<String>,
        repository: Option<String>,
        head_commit: Option<String>,
        delivery_id: Option<String>,
    ) -> Self {
        Self {
            source: TriggerSource::Push {
                repository,
                head_commit,
                delivery_id,
            },
            branch: branch.into(),
            received_at: Utc::now(),
        }
    }

    pub fn manual(branch: impl Into<String>) -> Self {
        Self {
            source: TriggerSource::Manual,
            branch: branch.into(),
            received_at: Utc::now(),
        }
    }

    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self.source {
            TriggerSource::Push { .. } => "push",
            TriggerSource::Manual => "manual",
        }
    }
}
