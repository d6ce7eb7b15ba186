//! Deployment run tracking types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trigger::DeployTrigger;

/// A pipeline stage. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Building,
    Publishing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Building => "building",
            Stage::Publishing => "publishing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state machine.
///
/// `Idle -> Fetching -> Building -> Publishing -> {Succeeded, Failed(stage)}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running(Stage),
    Succeeded,
    Failed(Stage),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed(_))
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All three stages completed.
    Succeeded,
    /// A stage failed; later stages were skipped.
    Failed { stage: Stage, cause: String },
    /// Another run held the deployment lock. Nothing was executed.
    Busy,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    /// The terminal state this outcome corresponds to, if the run executed.
    pub fn terminal_state(&self) -> Option<RunState> {
        match self {
            RunOutcome::Succeeded => Some(RunState::Succeeded),
            RunOutcome::Failed { stage, .. } => Some(RunState::Failed(*stage)),
            RunOutcome::Busy => None,
        }
    }
}

/// Record of one deployment run, emitted to the logs when the run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// UUIDv7 assigned when the orchestrator accepted the trigger.
    pub run_id: Uuid,
    pub trigger: DeployTrigger,
    pub outcome: RunOutcome,
    /// Stages that completed successfully, in order.
    pub completed_stages: Vec<Stage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
