//! Progressive script building from agent tool calls
//!
//! Each tool call maps to exactly one step. Steps are validated as they are
//! appended, and `finalize` validates the whole script once more.

use action_flow::{
    validate_script, validate_step, ParamValue, RecoveryHint, SchemaOptions, Script, Step,
};
use action_locator::Selector;
use action_primitives::ActionKind;
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::debug;
use uiscript_core_types::ToolCall;

use crate::errors::AgentError;

fn string_field(tool: &str, key: &str, value: &Value) -> Result<String, AgentError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AgentError::malformed(tool, format!("'{key}' must be a string")))
}

/// Map one tool call to a step
///
/// The tool name is the action name (`tap`, `type`, `scroll_to_find`, ...).
/// `selector`, `capture`, `id` and `recovery_hints` configure the step; every
/// other payload key becomes an action parameter.
pub fn step_from_tool_call(call: &ToolCall) -> Result<Step, AgentError> {
    let tool = call.tool.as_str();
    let action =
        ActionKind::from_str(tool).map_err(|_| AgentError::UnknownTool(tool.to_string()))?;
    let mut step = Step::new(action);

    let payload = match &call.payload {
        Value::Null => return Ok(step),
        Value::Object(payload) => payload,
        _ => return Err(AgentError::malformed(tool, "payload must be an object")),
    };

    for (key, value) in payload {
        match key.as_str() {
            "selector" => {
                let text = string_field(tool, key, value)?;
                let selector = Selector::parse(&text)
                    .map_err(|err| AgentError::malformed(tool, err.to_string()))?;
                step.selector = Some(selector);
            }
            "capture" => step.capture = Some(string_field(tool, key, value)?),
            "id" => step.id = Some(string_field(tool, key, value)?),
            "recovery_hints" => {
                step.recovery_hints = serde_json::from_value::<Vec<RecoveryHint>>(value.clone())
                    .map_err(|err| AgentError::malformed(tool, err.to_string()))?;
            }
            param => {
                let value = serde_json::from_value::<ParamValue>(value.clone())
                    .map_err(|err| AgentError::malformed(tool, err.to_string()))?;
                step.params.insert(param.to_string(), value);
            }
        }
    }

    if let Some(call_id) = &call.call_id {
        if step.id.is_none() {
            step.id = Some(call_id.clone());
        }
    }
    Ok(step)
}

/// Script under construction
#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    script: Script,
    known: BTreeSet<String>,
    options: SchemaOptions,
}

impl ScriptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            script: Script::new(name),
            known: BTreeSet::new(),
            options: SchemaOptions::default(),
        }
    }

    /// Reject selectors that rely on position only
    pub fn strict(mut self) -> Self {
        self.options.reject_positional = true;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        self.known.insert(name.clone());
        self.script = self.script.with_variable(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.script.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.script.steps
    }

    /// Validate and append one step; a rejected step leaves the builder unchanged
    pub fn push_step(&mut self, step: Step) -> Result<&Step, AgentError> {
        let index = self.script.steps.len();
        validate_step(&step, index, &self.known, self.options)?;
        if let Some(capture) = &step.capture {
            self.known.insert(capture.clone());
        }
        debug!(step = index, action = %step.action, "Appended script step");
        self.script.steps.push(step);
        Ok(&self.script.steps[index])
    }

    pub fn push_tool_call(&mut self, call: &ToolCall) -> Result<&Step, AgentError> {
        let step = step_from_tool_call(call)?;
        self.push_step(step)
    }

    /// Validate the whole script and hand it over
    pub fn finalize(self) -> Result<Script, AgentError> {
        if let Some(err) = validate_script(&self.script, self.options).into_iter().next() {
            return Err(AgentError::Schema(err));
        }
        Ok(self.script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_maps_to_one_step() {
        let call = ToolCall::new(
            "scroll_to_find",
            json!({"selector": "text=Settings", "direction": "down", "max_attempts": 5, "capture": "row"}),
        );
        let step = step_from_tool_call(&call).unwrap();
        assert_eq!(step.action, ActionKind::ScrollToFind);
        assert_eq!(step.selector.unwrap().to_string(), "text=Settings");
        assert_eq!(step.params.len(), 2);
        assert_eq!(step.capture.as_deref(), Some("row"));
    }

    #[test]
    fn var_refs_survive_tool_calls() {
        let call = ToolCall::new("type", json!({"selector": "id=q", "text": {"var": "query"}}));
        let step = step_from_tool_call(&call).unwrap();
        assert_eq!(step.params["text"], ParamValue::var("query"));
    }

    #[test]
    fn call_id_becomes_step_id() {
        let mut call = ToolCall::new("read_screen", Value::Null);
        call.call_id = Some("call-7".into());
        assert_eq!(step_from_tool_call(&call).unwrap().id.as_deref(), Some("call-7"));
    }

    #[test]
    fn bad_tool_calls() {
        assert!(matches!(
            step_from_tool_call(&ToolCall::new("swipe", Value::Null)),
            Err(AgentError::UnknownTool(_))
        ));
        assert!(matches!(
            step_from_tool_call(&ToolCall::new("tap", json!({"selector": "id="}))),
            Err(AgentError::MalformedToolCall { .. })
        ));
        assert!(matches!(
            step_from_tool_call(&ToolCall::new("tap", json!(["id=a"]))),
            Err(AgentError::MalformedToolCall { .. })
        ));
    }
}
