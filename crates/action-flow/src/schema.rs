//! Static script validation
//!
//! A script is schema-valid when every step carries the selector and
//! parameters its action needs, literal parameters have the right shape, and
//! every variable referenced by a step is declared or captured by an earlier
//! step.

use action_locator::SelectorStability;
use std::collections::BTreeSet;

use crate::errors::{SchemaError, StepError};
use crate::request::{
    allowed_params, needs_selector, parse_condition, parse_direction, parse_format, parse_u32,
    parse_u64, required_params,
};
use crate::types::{ParamValue, Script, Step};
use crate::vars::{is_valid_name, param_references, selector_references};

/// Validation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Reject selectors that rely on position only
    pub reject_positional: bool,
}

/// Validate one step at position `index` against the names bound so far
pub fn validate_step(
    step: &Step,
    index: usize,
    known: &BTreeSet<String>,
    options: SchemaOptions,
) -> Result<(), SchemaError> {
    if needs_selector(step) && step.selector.is_none() {
        return Err(SchemaError::MissingSelector {
            step: index,
            action: step.action,
        });
    }

    let allowed = allowed_params(step.action);
    if let Some(unknown) = step.params.keys().find(|name| !allowed.contains(&name.as_str())) {
        return Err(SchemaError::UnknownParam {
            step: index,
            action: step.action,
            param: unknown.clone(),
        });
    }
    if let Some(missing) = required_params(step.action)
        .iter()
        .find(|name| !step.params.contains_key(**name))
    {
        return Err(SchemaError::MissingParam {
            step: index,
            action: step.action,
            param: missing.to_string(),
        });
    }

    for (name, value) in &step.params {
        if let ParamValue::Literal(literal) = value {
            check_literal(name, literal).map_err(|err| match err {
                StepError::InvalidParam { param, reason } => SchemaError::InvalidParam {
                    step: index,
                    param,
                    reason,
                },
                other => SchemaError::InvalidParam {
                    step: index,
                    param: name.clone(),
                    reason: other.to_string(),
                },
            })?;
        }
    }

    let mut references: Vec<String> = step
        .selector
        .as_ref()
        .map(selector_references)
        .unwrap_or_default();
    for value in step.params.values() {
        references.extend(param_references(value));
    }
    if let Some(name) = references.into_iter().find(|name| !known.contains(name)) {
        return Err(SchemaError::DanglingVariable { step: index, name });
    }

    if let Some(capture) = &step.capture {
        if !is_valid_name(capture) {
            return Err(SchemaError::InvalidCapture {
                step: index,
                name: capture.clone(),
            });
        }
    }

    if options.reject_positional {
        if let Some(selector) = &step.selector {
            if selector.stability() == SelectorStability::Positional {
                return Err(SchemaError::PositionalSelector {
                    step: index,
                    selector: selector.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn check_literal(name: &str, value: &serde_json::Value) -> Result<(), StepError> {
    // Placeholders are only checked for binding; their values arrive at run time.
    if value.as_str().is_some_and(|s| s.contains("${")) {
        return Ok(());
    }
    match name {
        "duration_ms" | "timeout_ms" => parse_u64(name, value).map(|_| ()),
        "max_attempts" => parse_u32(name, value).map(|_| ()),
        "direction" => parse_direction(value).map(|_| ()),
        "format" => parse_format(value).map(|_| ()),
        "condition" => parse_condition(value).map(|_| ()),
        _ => Ok(()),
    }
}

/// Validate steps in order, threading the set of bound names
///
/// `known` starts as the names visible before the first step and ends with
/// every capture added.
pub fn validate_steps(
    steps: &[Step],
    known: &mut BTreeSet<String>,
    options: SchemaOptions,
) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        if let Err(err) = validate_step(step, index, known, options) {
            errors.push(err);
        }
        if let Some(capture) = &step.capture {
            known.insert(capture.clone());
        }
    }
    errors
}

/// Every schema violation of `script`, in step order
pub fn validate_script(script: &Script, options: SchemaOptions) -> Vec<SchemaError> {
    let mut known: BTreeSet<String> = script.variables.keys().cloned().collect();
    validate_steps(&script.steps, &mut known, options)
}

impl Script {
    /// First schema violation, if any
    pub fn validate(&self) -> Result<(), SchemaError> {
        match validate_script(self, SchemaOptions::default()).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
