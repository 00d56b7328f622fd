//! Core data types for the action executor

use action_locator::Selector;
use perceiver_structural::ScreenSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uiscript_core_types::{ActionId, RunId, SnapshotId};

use crate::device::ScrollDirection;

/// Execution context for one action
///
/// Carries identity for tracing and the run-level cancellation signal that
/// every suspension point observes.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Run this action belongs to
    pub run_id: RunId,

    /// Unique identifier for this action
    pub action_id: ActionId,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,
}

impl ExecCtx {
    pub fn new(run_id: RunId, cancel_token: CancellationToken) -> Self {
        Self {
            run_id,
            action_id: ActionId::new(),
            cancel_token,
        }
    }

    /// Same run and token, fresh action id
    pub fn next_action(&self) -> Self {
        Self::new(self.run_id.clone(), self.cancel_token.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Action kinds exposed as script steps and generator tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    LongPress,
    Clear,
    #[serde(rename = "type")]
    TypeText,
    ReadScreen,
    ScrollToFind,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Tap,
        ActionKind::LongPress,
        ActionKind::Clear,
        ActionKind::TypeText,
        ActionKind::ReadScreen,
        ActionKind::ScrollToFind,
        ActionKind::Wait,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::LongPress => "long_press",
            ActionKind::Clear => "clear",
            ActionKind::TypeText => "type",
            ActionKind::ReadScreen => "read_screen",
            ActionKind::ScrollToFind => "scroll_to_find",
            ActionKind::Wait => "wait",
        }
    }

    /// Whether the step must carry a selector
    pub fn requires_selector(&self) -> bool {
        matches!(
            self,
            ActionKind::Tap
                | ActionKind::LongPress
                | ActionKind::Clear
                | ActionKind::TypeText
                | ActionKind::ScrollToFind
        )
    }

    /// Whether the action acts on exactly one element
    pub fn is_single_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Tap | ActionKind::LongPress | ActionKind::Clear | ActionKind::TypeText
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Output format of `read_screen`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFormat {
    /// Entire element tree
    Full,
    /// Interactive and text-bearing elements, flattened
    Summary,
    /// Subtrees rooted at the selector's matches
    Targeted(Selector),
}

impl ReadFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ReadFormat::Full => "full",
            ReadFormat::Summary => "summary",
            ReadFormat::Targeted(_) => "targeted",
        }
    }
}

/// Predicate polled by `wait`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Selector resolves to at least one element
    Present(Selector),
    /// Selector resolves to nothing
    Absent(Selector),
    /// Selector resolves and every match is enabled
    Enabled(Selector),
    /// Two consecutive polls see the same tree
    ScreenStable,
}

impl WaitCondition {
    pub fn name(&self) -> &'static str {
        match self {
            WaitCondition::Present(_) => "present",
            WaitCondition::Absent(_) => "absent",
            WaitCondition::Enabled(_) => "enabled",
            WaitCondition::ScreenStable => "stable",
        }
    }
}

/// Fully resolved action, variables already substituted
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Tap {
        selector: Selector,
    },
    LongPress {
        selector: Selector,
        duration_ms: Option<u64>,
    },
    Clear {
        selector: Selector,
    },
    TypeText {
        selector: Selector,
        text: String,
    },
    ReadScreen {
        format: ReadFormat,
    },
    ScrollToFind {
        selector: Selector,
        direction: ScrollDirection,
        max_attempts: Option<u32>,
    },
    Wait {
        condition: WaitCondition,
        timeout_ms: Option<u64>,
    },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Tap { .. } => ActionKind::Tap,
            ActionRequest::LongPress { .. } => ActionKind::LongPress,
            ActionRequest::Clear { .. } => ActionKind::Clear,
            ActionRequest::TypeText { .. } => ActionKind::TypeText,
            ActionRequest::ReadScreen { .. } => ActionKind::ReadScreen,
            ActionRequest::ScrollToFind { .. } => ActionKind::ScrollToFind,
            ActionRequest::Wait { .. } => ActionKind::Wait,
        }
    }
}

/// Typed reason carried by every action failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Selector resolved to nothing
    NoTarget,
    /// Selector resolved to several elements without a pick policy
    AmbiguousTarget,
    /// `scroll_to_find` exhausted its attempts
    NotFound,
    /// `wait` condition never held
    Timeout,
    /// Device refused or could not deliver the action
    DeviceError,
    /// Run-level cancellation observed
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::NoTarget => "NoTarget",
            FailureReason::AmbiguousTarget => "AmbiguousTarget",
            FailureReason::NotFound => "NotFound",
            FailureReason::Timeout => "Timeout",
            FailureReason::DeviceError => "DeviceError",
            FailureReason::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Failure of one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFailure {
    pub reason: FailureReason,
    pub detail: String,
    /// Snapshot the failure was observed on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
    #[serde(skip)]
    pub snapshot: Option<Arc<ScreenSnapshot>>,
}

impl ActionFailure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            snapshot_id: None,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Arc<ScreenSnapshot>) -> Self {
        self.snapshot_id = Some(snapshot.id.clone());
        self.snapshot = Some(snapshot);
        self
    }
}

/// Per-step outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Failure(ActionFailure),
}

impl ExecutionResult {
    pub fn success() -> Self {
        ExecutionResult::Success { value: None }
    }

    pub fn success_with(value: Value) -> Self {
        ExecutionResult::Success { value: Some(value) }
    }

    pub fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        ExecutionResult::Failure(ActionFailure::new(reason, detail))
    }

    pub fn failure_on(
        reason: FailureReason,
        detail: impl Into<String>,
        snapshot: Arc<ScreenSnapshot>,
    ) -> Self {
        ExecutionResult::Failure(ActionFailure::new(reason, detail).with_snapshot(snapshot))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ExecutionResult::Success { value } => value.as_ref(),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ActionFailure> {
        match self {
            ExecutionResult::Failure(failure) => Some(failure),
            ExecutionResult::Success { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.as_failure().map(|failure| failure.reason)
    }
}

/// Executor tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pause between polls in `wait`
    pub poll_interval_ms: u64,
    /// `wait` timeout when the step does not set one
    pub default_wait_timeout_ms: u64,
    /// `long_press` duration when the step does not set one
    pub default_long_press_ms: u64,
    /// `scroll_to_find` attempts when the step does not set them
    pub default_scroll_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_wait_timeout_ms: 5000,
            default_long_press_ms: 800,
            default_scroll_attempts: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.name().parse::<ActionKind>().unwrap(), kind);
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.name()));
        }
        assert!("swipe".parse::<ActionKind>().is_err());
    }

    #[test]
    fn selector_requirements() {
        assert!(ActionKind::Tap.requires_selector());
        assert!(ActionKind::ScrollToFind.requires_selector());
        assert!(!ActionKind::ReadScreen.requires_selector());
        assert!(!ActionKind::Wait.requires_selector());
        assert!(!ActionKind::ScrollToFind.is_single_target());
    }

    #[test]
    fn execution_result_serializes_with_outcome_tag() {
        let ok = ExecutionResult::success_with(json!({"count": 2}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"outcome": "success", "value": {"count": 2}})
        );

        let failed = ExecutionResult::failure(FailureReason::NoTarget, "nothing matched id=login");
        let encoded = serde_json::to_value(&failed).unwrap();
        assert_eq!(encoded["outcome"], "failure");
        assert_eq!(encoded["reason"], "NoTarget");
        let back: ExecutionResult = serde_json::from_value(encoded).unwrap();
        assert_eq!(back.failure_reason(), Some(FailureReason::NoTarget));
    }

    #[test]
    fn exec_ctx_shares_cancellation() {
        let token = CancellationToken::new();
        let ctx = ExecCtx::new(RunId::new(), token.clone());
        let next = ctx.next_action();
        assert_ne!(ctx.action_id, next.action_id);
        token.cancel();
        assert!(ctx.is_cancelled() && next.is_cancelled());
    }
}
