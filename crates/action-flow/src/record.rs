//! Run records
//!
//! A [`RunRecord`] is returned for every run, whatever the outcome. It keeps
//! the step-by-step trace, the engine state path, every recovery exchange
//! and the terminal reason.

use action_primitives::{ActionFailure, ActionKind, ExecutionResult, FailureReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uiscript_core_types::RunId;

use crate::state::{EngineState, StateTransition};

/// Where an executed step came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOrigin {
    /// Declared in the script being run
    Script,
    /// Part of the corrective script returned by negotiation `negotiation`
    Corrective { negotiation: u32 },
}

/// What happened to a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepResult {
    /// The action reached the executor
    Executed(ExecutionResult),
    /// The step could not be built from its parameters; nothing was executed
    Invalid { invalid: String },
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Executed(result) if result.is_success())
    }

    pub fn as_failure(&self) -> Option<&ActionFailure> {
        match self {
            StepResult::Executed(result) => result.as_failure(),
            StepResult::Invalid { .. } => None,
        }
    }

    pub fn executed(&self) -> Option<&ExecutionResult> {
        match self {
            StepResult::Executed(result) => Some(result),
            StepResult::Invalid { .. } => None,
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the script the step belongs to
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub action: ActionKind,
    /// Selector after variable substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub origin: StepOrigin,
    pub result: StepResult,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// Final status label of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Aborted,
    RecoveredAndCompleted,
    RecoveredAndAborted,
}

impl RunStatus {
    pub fn derive(completed: bool, recovered: bool) -> Self {
        match (completed, recovered) {
            (true, false) => RunStatus::Completed,
            (true, true) => RunStatus::RecoveredAndCompleted,
            (false, false) => RunStatus::Aborted,
            (false, true) => RunStatus::RecoveredAndAborted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::RecoveredAndCompleted)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a run ended in `Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    NoTarget,
    AmbiguousTarget,
    NotFound,
    Timeout,
    DeviceError,
    AgentUnavailable,
    InvalidRecoveryResponse,
    Cancelled,
    RecursionBoundExceeded,
    /// Agent returned a terminal verdict
    AgentVerdict,
    /// Step could not be built at run time (unbound variable, bad value)
    InvalidStep,
}

impl From<FailureReason> for AbortReason {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::NoTarget => AbortReason::NoTarget,
            FailureReason::AmbiguousTarget => AbortReason::AmbiguousTarget,
            FailureReason::NotFound => AbortReason::NotFound,
            FailureReason::Timeout => AbortReason::Timeout,
            FailureReason::DeviceError => AbortReason::DeviceError,
            FailureReason::Cancelled => AbortReason::Cancelled,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal reason of an aborted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortInfo {
    pub reason: AbortReason,
    pub detail: String,
    /// Script step the engine was positioned at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

/// What the recovery handler decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDecision {
    Corrective { steps: usize },
    Terminal { reason: AbortReason, detail: String },
}

/// Outcome of a corrective script run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectiveRun {
    pub completed: bool,
    pub transitions: Vec<StateTransition>,
    /// Whether the failed step's selector resolved afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resolved: Option<bool>,
}

/// Read-only audit of one recovery negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAudit {
    /// Failed script step
    pub step: usize,
    /// Negotiation depth within the failure episode, from 0
    pub depth: u32,
    pub failure_reason: FailureReason,
    /// Request as sent, when one was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Raw response as received, when one was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub decision: AuditDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrective: Option<CorrectiveRun>,
    pub duration_ms: u64,
}

impl RecoveryAudit {
    pub fn ran_corrective(&self) -> bool {
        matches!(self.decision, AuditDecision::Corrective { .. })
    }
}

/// Complete trace of one script run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub script: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortInfo>,
    pub steps: Vec<StepRecord>,
    pub transitions: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recoveries: Vec<RecoveryAudit>,
    /// Depth of the latest negotiation in the failure episode open at the
    /// end of the run; 0 when the episode is closed
    pub negotiation_depth: u32,
    /// Deepest negotiation held in any episode; never above the bound
    pub max_negotiation_depth: u32,
    pub variables: BTreeMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunRecord {
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Whether any corrective script was run
    pub fn recovered(&self) -> bool {
        self.recoveries.iter().any(RecoveryAudit::ran_corrective)
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort.as_ref().map(|abort| abort.reason)
    }

    pub fn final_state(&self) -> EngineState {
        self.transitions
            .last()
            .map(|t| t.to)
            .unwrap_or(EngineState::Pending)
    }

    /// Records of steps declared by the script, in execution order
    pub fn script_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|record| record.origin == StepOrigin::Script)
    }

    /// Number of negotiations held during the run
    pub fn negotiations(&self) -> usize {
        self.recoveries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels() {
        assert_eq!(RunStatus::derive(true, false), RunStatus::Completed);
        assert_eq!(RunStatus::derive(true, true), RunStatus::RecoveredAndCompleted);
        assert_eq!(RunStatus::derive(false, false), RunStatus::Aborted);
        assert_eq!(RunStatus::derive(false, true), RunStatus::RecoveredAndAborted);
        assert!(RunStatus::RecoveredAndCompleted.is_completed());
        assert!(!RunStatus::RecoveredAndAborted.is_completed());
    }

    #[test]
    fn failure_reasons_map_to_abort_reasons() {
        assert_eq!(AbortReason::from(FailureReason::NoTarget), AbortReason::NoTarget);
        assert_eq!(AbortReason::from(FailureReason::Cancelled), AbortReason::Cancelled);
        assert_eq!(
            serde_json::to_value(AbortReason::RecursionBoundExceeded).unwrap(),
            serde_json::json!("RecursionBoundExceeded")
        );
    }

    #[test]
    fn step_results_keep_their_wire_shape() {
        let executed = StepResult::Executed(ExecutionResult::success());
        assert_eq!(
            serde_json::to_value(&executed).unwrap(),
            serde_json::json!({"outcome": "success"})
        );
        assert!(executed.is_success());

        let invalid = StepResult::Invalid {
            invalid: "unbound variable 'x'".into(),
        };
        let value = serde_json::to_value(&invalid).unwrap();
        assert_eq!(value, serde_json::json!({"invalid": "unbound variable 'x'"}));
        let back: StepResult = serde_json::from_value(value).unwrap();
        assert!(!back.is_success());
        assert!(back.as_failure().is_none());
        assert!(back.executed().is_none());
    }
}
