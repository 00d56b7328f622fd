//! Error types for device access

use perceiver_structural::PerceiverError;
use thiserror::Error;

/// Errors reported by a device handle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device or session is gone
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// Device refused to deliver the input
    #[error("Input rejected: {0}")]
    Rejected(String),

    /// Screen could not be captured
    #[error("Screen capture failed: {0}")]
    Capture(String),

    /// Operation is not supported by this device
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DeviceError {
    /// Check if retrying the same input could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Capture(_))
    }
}

impl From<PerceiverError> for DeviceError {
    fn from(err: PerceiverError) -> Self {
        DeviceError::Capture(err.to_string())
    }
}
