use action_flow::SchemaError;
use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Raised when the agent could not be reached or the exchange broke off.
    #[error("agent transport failed: {0}")]
    Transport(String),

    /// Raised when the agent answered with a non-success HTTP status.
    #[error("agent answered with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Raised when a tool call names no known action.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Raised when a tool call payload cannot be turned into a step.
    #[error("malformed '{tool}' call: {reason}")]
    MalformedToolCall { tool: String, reason: String },

    /// Raised when a built step or script breaks the script schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl AgentError {
    /// Helper for transport failures.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Helper for malformed tool calls.
    pub fn malformed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedToolCall {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

/// Why a raw recovery response was rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("response is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown response kind '{0}'")]
    UnknownKind(String),

    #[error("corrective script has no steps")]
    EmptyScript,

    #[error("corrective script has {count} steps; at most {max} are allowed")]
    TooManySteps { count: usize, max: usize },

    #[error("step {index} is malformed: {reason}")]
    MalformedStep { index: usize, reason: String },

    #[error("corrective script is not schema-valid: {0}")]
    Schema(#[from] SchemaError),
}
