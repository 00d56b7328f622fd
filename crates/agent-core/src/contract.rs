//! Recovery contract exchanged with the AI agent
//!
//! The engine sends a [`RecoveryRequest`] and receives raw JSON back. The
//! response is only trusted after [`RecoveryResponse::parse`] has checked its
//! shape and validated any corrective script against the script schema.

use action_flow::{
    validate_steps, RecoveryContext, RecoveryHint, SchemaOptions, Step, StepOrigin, StepRecord,
    StepResult,
};
use action_primitives::{ActionKind, ExecutionResult, FailureReason};
use perceiver_structural::{render_summary, SummaryEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uiscript_core_types::RunId;

use crate::errors::ContractError;

pub const KIND_CORRECTIVE: &str = "corrective_script";
pub const KIND_TERMINAL: &str = "terminal";

/// One recent step outcome as the agent sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// True for steps of a corrective script
    pub corrective: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&StepRecord> for HistoryEntry {
    fn from(record: &StepRecord) -> Self {
        let (failure_reason, detail) = match &record.result {
            StepResult::Executed(ExecutionResult::Success { .. }) => (None, None),
            StepResult::Executed(ExecutionResult::Failure(failure)) => {
                (Some(failure.reason), Some(failure.detail.clone()))
            }
            StepResult::Invalid { invalid } => (None, Some(invalid.clone())),
        };
        Self {
            index: record.index,
            step_id: record.step_id.clone(),
            action: record.action,
            selector: record.selector.clone(),
            corrective: record.origin != StepOrigin::Script,
            success: record.is_success(),
            failure_reason,
            detail,
        }
    }
}

/// Request sent to the agent for one failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub run_id: RunId,
    pub script: String,
    pub step_index: usize,
    pub failed_step: Step,
    pub failure_reason: FailureReason,
    pub failure_detail: String,
    /// Screen at failure time, summary format
    pub current_screen: Vec<SummaryEntry>,
    pub recent_history: Vec<HistoryEntry>,
    /// The failed step's hints, verbatim
    pub recovery_hints: Vec<RecoveryHint>,
    pub negotiation_depth: u32,
    /// Variable names a corrective script may reference
    pub variables: Vec<String>,
}

impl RecoveryRequest {
    /// Build a fresh request; `history_window` bounds the recent history
    pub fn from_context(context: &RecoveryContext, history_window: usize) -> Self {
        let history = &context.recent_history;
        let start = history.len().saturating_sub(history_window);
        Self {
            run_id: context.run_id.clone(),
            script: context.script.clone(),
            step_index: context.step_index,
            failed_step: context.failed_step.clone(),
            failure_reason: context.failure.reason,
            failure_detail: context.failure.detail.clone(),
            current_screen: context
                .screen
                .as_deref()
                .map(render_summary)
                .unwrap_or_default(),
            recent_history: history[start..].iter().map(HistoryEntry::from).collect(),
            recovery_hints: context.failed_step.recovery_hints.clone(),
            negotiation_depth: context.depth,
            variables: context.variables.keys().cloned().collect(),
        }
    }
}

/// Validated agent answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryResponse {
    CorrectiveScript { steps: Vec<Step> },
    Terminal { reason: String },
}

/// Checks applied to a corrective script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractLimits {
    pub max_steps: usize,
    pub schema: SchemaOptions,
}

impl Default for ContractLimits {
    fn default() -> Self {
        Self {
            max_steps: 10,
            schema: SchemaOptions::default(),
        }
    }
}

fn field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, ContractError> {
    match object.get(name) {
        Some(Value::Null) | None => Err(ContractError::MissingField(name)),
        Some(value) => Ok(value),
    }
}

impl RecoveryResponse {
    /// Parse and validate a raw response
    ///
    /// `known` holds the variable names bound in the run; corrective steps
    /// may reference those and names captured by their own earlier steps.
    pub fn parse(
        raw: &Value,
        known: &BTreeSet<String>,
        limits: ContractLimits,
    ) -> Result<Self, ContractError> {
        let object = raw.as_object().ok_or(ContractError::NotAnObject)?;
        let kind = field(object, "kind")?
            .as_str()
            .ok_or(ContractError::WrongType {
                field: "kind",
                expected: "a string",
            })?;

        match kind {
            KIND_CORRECTIVE => {
                let raw_steps = field(object, "steps")?
                    .as_array()
                    .ok_or(ContractError::WrongType {
                        field: "steps",
                        expected: "an array of steps",
                    })?;
                if raw_steps.is_empty() {
                    return Err(ContractError::EmptyScript);
                }
                if raw_steps.len() > limits.max_steps {
                    return Err(ContractError::TooManySteps {
                        count: raw_steps.len(),
                        max: limits.max_steps,
                    });
                }

                let steps = raw_steps
                    .iter()
                    .enumerate()
                    .map(|(index, value)| {
                        serde_json::from_value::<Step>(value.clone()).map_err(|err| {
                            ContractError::MalformedStep {
                                index,
                                reason: err.to_string(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let mut bound = known.clone();
                if let Some(err) = validate_steps(&steps, &mut bound, limits.schema)
                    .into_iter()
                    .next()
                {
                    return Err(ContractError::Schema(err));
                }
                Ok(RecoveryResponse::CorrectiveScript { steps })
            }
            KIND_TERMINAL => {
                let reason = field(object, "reason")?
                    .as_str()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .ok_or(ContractError::WrongType {
                        field: "reason",
                        expected: "a non-empty string",
                    })?;
                Ok(RecoveryResponse::Terminal {
                    reason: reason.to_string(),
                })
            }
            other => Err(ContractError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::SchemaError;
    use serde_json::json;

    fn known(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn parse(raw: Value) -> Result<RecoveryResponse, ContractError> {
        RecoveryResponse::parse(&raw, &known(&["user"]), ContractLimits::default())
    }

    #[test]
    fn accepts_terminal_verdict() {
        let response = parse(json!({"kind": "terminal", "reason": "element removed"})).unwrap();
        assert_eq!(
            response,
            RecoveryResponse::Terminal {
                reason: "element removed".into()
            }
        );
    }

    #[test]
    fn accepts_corrective_script() {
        let response = parse(json!({
            "kind": "corrective_script",
            "steps": [
                {"action": "tap", "selector": "text=Menu"},
                {"action": "read_screen", "params": {"format": "summary"}, "capture": "menu"},
                {"action": "type", "selector": "id=search", "params": {"text": "${user} ${menu}"}}
            ]
        }))
        .unwrap();
        match response {
            RecoveryResponse::CorrectiveScript { steps } => assert_eq!(steps.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn corrective_without_steps_is_rejected() {
        assert_eq!(
            parse(json!({"kind": "corrective_script"})),
            Err(ContractError::MissingField("steps"))
        );
        assert_eq!(
            parse(json!({"kind": "corrective_script", "steps": []})),
            Err(ContractError::EmptyScript)
        );
        assert!(matches!(
            parse(json!({"kind": "corrective_script", "steps": {"action": "tap"}})),
            Err(ContractError::WrongType { field: "steps", .. })
        ));
    }

    #[test]
    fn shape_errors() {
        assert_eq!(parse(json!("retry")), Err(ContractError::NotAnObject));
        assert_eq!(parse(json!({"steps": []})), Err(ContractError::MissingField("kind")));
        assert_eq!(
            parse(json!({"kind": "retry"})),
            Err(ContractError::UnknownKind("retry".into()))
        );
        assert!(matches!(
            parse(json!({"kind": "terminal", "reason": "  "})),
            Err(ContractError::WrongType { field: "reason", .. })
        ));
    }

    #[test]
    fn step_level_errors_carry_the_index() {
        let err = parse(json!({
            "kind": "corrective_script",
            "steps": [{"action": "tap", "selector": "id=a"}, {"action": "swipe"}]
        }))
        .unwrap_err();
        assert!(matches!(err, ContractError::MalformedStep { index: 1, .. }));

        let err = parse(json!({
            "kind": "corrective_script",
            "steps": [{"action": "tap"}]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ContractError::Schema(SchemaError::MissingSelector { step: 0, .. })
        ));
    }

    #[test]
    fn unbound_variables_are_rejected() {
        let err = parse(json!({
            "kind": "corrective_script",
            "steps": [{"action": "type", "selector": "id=q", "params": {"text": "${password}"}}]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ContractError::Schema(SchemaError::DanglingVariable { .. })
        ));
    }

    #[test]
    fn step_count_is_bounded() {
        let steps: Vec<Value> = (0..3)
            .map(|_| json!({"action": "read_screen"}))
            .collect();
        let limits = ContractLimits {
            max_steps: 2,
            ..ContractLimits::default()
        };
        let err = RecoveryResponse::parse(
            &json!({"kind": "corrective_script", "steps": steps}),
            &BTreeSet::new(),
            limits,
        )
        .unwrap_err();
        assert_eq!(err, ContractError::TooManySteps { count: 3, max: 2 });
    }

    #[test]
    fn strict_limits_reject_positional_selectors() {
        let limits = ContractLimits {
            schema: SchemaOptions {
                reject_positional: true,
            },
            ..ContractLimits::default()
        };
        let err = RecoveryResponse::parse(
            &json!({
                "kind": "corrective_script",
                "steps": [{"action": "tap", "selector": "below(id=title) @nth=2"}]
            }),
            &BTreeSet::new(),
            limits,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ContractError::Schema(SchemaError::PositionalSelector { .. })
        ));
    }
}
