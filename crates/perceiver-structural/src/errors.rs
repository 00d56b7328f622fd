use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PerceiverError {
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("malformed screen tree: {0}")]
    Malformed(String),
    #[error("capture cancelled while the screen settled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
