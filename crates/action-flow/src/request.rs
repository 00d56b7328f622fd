//! Turning a step into an executable action
//!
//! The same parameter rules back both run-time conversion and static schema
//! validation, so a step that validates never fails here for type reasons
//! unless a variable holds an unexpected value.

use action_locator::Selector;
use action_primitives::{ActionKind, ActionRequest, ReadFormat, ScrollDirection, WaitCondition};
use serde_json::Value;

use crate::errors::StepError;
use crate::types::Step;
use crate::vars::Variables;

/// Parameters each action accepts
pub fn allowed_params(action: ActionKind) -> &'static [&'static str] {
    match action {
        ActionKind::Tap | ActionKind::Clear => &[],
        ActionKind::LongPress => &["duration_ms"],
        ActionKind::TypeText => &["text"],
        ActionKind::ReadScreen => &["format"],
        ActionKind::ScrollToFind => &["direction", "max_attempts"],
        ActionKind::Wait => &["condition", "timeout_ms"],
    }
}

/// Parameters that must be present
pub fn required_params(action: ActionKind) -> &'static [&'static str] {
    match action {
        ActionKind::TypeText => &["text"],
        _ => &[],
    }
}

/// `read_screen` format name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatName {
    Full,
    Summary,
    Targeted,
}

/// `wait` condition name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionName {
    Present,
    Absent,
    Enabled,
    Stable,
}

impl ConditionName {
    pub fn needs_selector(&self) -> bool {
        !matches!(self, ConditionName::Stable)
    }
}

fn invalid(param: &str, reason: impl Into<String>) -> StepError {
    StepError::InvalidParam {
        param: param.to_string(),
        reason: reason.into(),
    }
}

pub fn parse_u64(param: &str, value: &Value) -> Result<u64, StepError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(param, format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(param, format!("expected a non-negative integer, got '{s}'"))),
        other => Err(invalid(param, format!("expected a non-negative integer, got {other}"))),
    }
}

pub fn parse_u32(param: &str, value: &Value) -> Result<u32, StepError> {
    let wide = parse_u64(param, value)?;
    u32::try_from(wide).map_err(|_| invalid(param, format!("{wide} is out of range")))
}

/// Text parameter: strings verbatim, other values as compact JSON
pub fn parse_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expect_str<'a>(param: &str, value: &'a Value) -> Result<&'a str, StepError> {
    value
        .as_str()
        .ok_or_else(|| invalid(param, format!("expected a string, got {value}")))
}

pub fn parse_direction(value: &Value) -> Result<ScrollDirection, StepError> {
    expect_str("direction", value)?
        .parse::<ScrollDirection>()
        .map_err(|reason| invalid("direction", reason))
}

pub fn parse_format(value: &Value) -> Result<FormatName, StepError> {
    match expect_str("format", value)? {
        "full" => Ok(FormatName::Full),
        "summary" => Ok(FormatName::Summary),
        "targeted" => Ok(FormatName::Targeted),
        other => Err(invalid(
            "format",
            format!("expected full, summary or targeted, got '{other}'"),
        )),
    }
}

pub fn parse_condition(value: &Value) -> Result<ConditionName, StepError> {
    match expect_str("condition", value)? {
        "present" => Ok(ConditionName::Present),
        "absent" => Ok(ConditionName::Absent),
        "enabled" => Ok(ConditionName::Enabled),
        "stable" => Ok(ConditionName::Stable),
        other => Err(invalid(
            "condition",
            format!("expected present, absent, enabled or stable, got '{other}'"),
        )),
    }
}

/// Whether the step needs a selector given its literal parameters
///
/// A `read_screen` with `format: targeted` and a `wait` on anything but
/// screen stability need one even though their action kind alone does not.
pub fn needs_selector(step: &Step) -> bool {
    if step.action.requires_selector() {
        return true;
    }
    let literal = |name: &str| match step.params.get(name) {
        Some(crate::types::ParamValue::Literal(value)) => Some(value.clone()),
        _ => None,
    };
    match step.action {
        ActionKind::ReadScreen => literal("format")
            .and_then(|value| parse_format(&value).ok())
            .map(|format| format == FormatName::Targeted)
            .unwrap_or(false),
        ActionKind::Wait => match literal("condition") {
            Some(value) => parse_condition(&value)
                .map(|condition| condition.needs_selector())
                .unwrap_or(false),
            None => step.selector.is_some(),
        },
        _ => false,
    }
}

/// Build the executable request for `step` using the current bindings
pub fn build_request(step: &Step, vars: &Variables) -> Result<ActionRequest, StepError> {
    let param = |name: &str| -> Result<Option<Value>, StepError> {
        step.params
            .get(name)
            .map(|value| vars.resolve(value))
            .transpose()
    };
    let selector = || -> Result<Selector, StepError> {
        let selector = step
            .selector
            .as_ref()
            .ok_or(StepError::MissingSelector(step.action))?;
        vars.resolve_selector(selector)
    };

    let request = match step.action {
        ActionKind::Tap => ActionRequest::Tap {
            selector: selector()?,
        },
        ActionKind::LongPress => ActionRequest::LongPress {
            selector: selector()?,
            duration_ms: param("duration_ms")?
                .map(|v| parse_u64("duration_ms", &v))
                .transpose()?,
        },
        ActionKind::Clear => ActionRequest::Clear {
            selector: selector()?,
        },
        ActionKind::TypeText => ActionRequest::TypeText {
            selector: selector()?,
            text: param("text")?
                .map(|v| parse_text(&v))
                .ok_or_else(|| StepError::MissingParam("text".to_string()))?,
        },
        ActionKind::ReadScreen => {
            let format = param("format")?
                .map(|v| parse_format(&v))
                .transpose()?
                .unwrap_or(FormatName::Summary);
            let format = match format {
                FormatName::Full => ReadFormat::Full,
                FormatName::Summary => ReadFormat::Summary,
                FormatName::Targeted => ReadFormat::Targeted(selector()?),
            };
            ActionRequest::ReadScreen { format }
        }
        ActionKind::ScrollToFind => ActionRequest::ScrollToFind {
            selector: selector()?,
            direction: param("direction")?
                .map(|v| parse_direction(&v))
                .transpose()?
                .unwrap_or_default(),
            max_attempts: param("max_attempts")?
                .map(|v| parse_u32("max_attempts", &v))
                .transpose()?,
        },
        ActionKind::Wait => {
            let condition = match param("condition")?.map(|v| parse_condition(&v)).transpose()? {
                Some(condition) => condition,
                None if step.selector.is_some() => ConditionName::Present,
                None => ConditionName::Stable,
            };
            let condition = match condition {
                ConditionName::Present => WaitCondition::Present(selector()?),
                ConditionName::Absent => WaitCondition::Absent(selector()?),
                ConditionName::Enabled => WaitCondition::Enabled(selector()?),
                ConditionName::Stable => WaitCondition::ScreenStable,
            };
            ActionRequest::Wait {
                condition,
                timeout_ms: param("timeout_ms")?
                    .map(|v| parse_u64("timeout_ms", &v))
                    .transpose()?,
            }
        }
    };
    Ok(request)
}
