//! Error types for the selector language

use thiserror::Error;

/// Errors raised while parsing the textual selector form
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorParseError {
    /// Input was empty or whitespace
    #[error("selector is empty")]
    Empty,

    /// A quoted value was not closed
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    /// Escape sequence other than \" or \\
    #[error("invalid escape '\\{found}' at offset {offset}")]
    InvalidEscape { offset: usize, found: char },

    /// Character that cannot start any token
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { offset: usize, found: char },

    /// Token did not fit the grammar
    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        offset: usize,
        expected: String,
        found: String,
    },

    /// Attribute or function name is not part of the language
    #[error("unknown selector key '{0}'")]
    UnknownKey(String),

    /// Operator not allowed for the attribute
    #[error("operator '{op}' is not supported for '{key}'")]
    UnsupportedOperator { key: String, op: String },

    /// Boolean attribute with a non-boolean value
    #[error("expected true or false for '{key}', found '{value}'")]
    InvalidBool { key: String, value: String },

    /// Pick modifier was malformed
    #[error("invalid pick modifier: {0}")]
    InvalidPick(String),
}
