//! Script and engine error types

use action_primitives::ActionKind;
use thiserror::Error;

/// Script loading and validation errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// Script failed schema validation
    #[error("Script validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// JSON encoding or decoding failed
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding or decoding failed
    #[error("YAML codec error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Script file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Script format could not be determined
    #[error("Unknown script format: {0}")]
    UnknownFormat(String),
}

/// Schema violation of one step
///
/// `step` is the 0-based position of the offending step in its script.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("step {step}: '{action}' requires a selector")]
    MissingSelector { step: usize, action: ActionKind },

    #[error("step {step}: '{action}' requires parameter '{param}'")]
    MissingParam {
        step: usize,
        action: ActionKind,
        param: String,
    },

    #[error("step {step}: '{action}' does not accept parameter '{param}'")]
    UnknownParam {
        step: usize,
        action: ActionKind,
        param: String,
    },

    #[error("step {step}: invalid value for '{param}': {reason}")]
    InvalidParam {
        step: usize,
        param: String,
        reason: String,
    },

    #[error("step {step}: variable '{name}' is not declared or bound by an earlier step")]
    DanglingVariable { step: usize, name: String },

    #[error("step {step}: invalid capture name '{name}'")]
    InvalidCapture { step: usize, name: String },

    #[error("step {step}: selector '{selector}' is positional; prefer id, role or text")]
    PositionalSelector { step: usize, selector: String },
}

impl SchemaError {
    pub fn step(&self) -> usize {
        match self {
            SchemaError::MissingSelector { step, .. }
            | SchemaError::MissingParam { step, .. }
            | SchemaError::UnknownParam { step, .. }
            | SchemaError::InvalidParam { step, .. }
            | SchemaError::DanglingVariable { step, .. }
            | SchemaError::InvalidCapture { step, .. }
            | SchemaError::PositionalSelector { step, .. } => *step,
        }
    }

    /// Same error, renumbered to `step`
    pub fn at(self, step: usize) -> Self {
        match self {
            SchemaError::MissingSelector { action, .. } => SchemaError::MissingSelector { step, action },
            SchemaError::MissingParam { action, param, .. } => {
                SchemaError::MissingParam { step, action, param }
            }
            SchemaError::UnknownParam { action, param, .. } => {
                SchemaError::UnknownParam { step, action, param }
            }
            SchemaError::InvalidParam { param, reason, .. } => {
                SchemaError::InvalidParam { step, param, reason }
            }
            SchemaError::DanglingVariable { name, .. } => SchemaError::DanglingVariable { step, name },
            SchemaError::InvalidCapture { name, .. } => SchemaError::InvalidCapture { step, name },
            SchemaError::PositionalSelector { selector, .. } => {
                SchemaError::PositionalSelector { step, selector }
            }
        }
    }
}

/// Step that cannot be turned into an action at run time
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("variable '{0}' is not bound")]
    UnboundVariable(String),

    #[error("'{0}' requires a selector")]
    MissingSelector(ActionKind),

    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid value for '{param}': {reason}")]
    InvalidParam { param: String, reason: String },
}
