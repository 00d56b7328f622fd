use serde::{Deserialize, Serialize};

/// Bounds for stabilized capture.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilizePolicy {
    /// Total captures allowed while waiting for two consecutive equal trees.
    pub stabilize_attempts: u32,
    /// Pause between captures in milliseconds.
    pub settle_interval_ms: u64,
}

impl Default for StabilizePolicy {
    fn default() -> Self {
        Self {
            stabilize_attempts: 3,
            settle_interval_ms: 100,
        }
    }
}
