//! Configuration for recovery negotiation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recovery orchestrator settings, passed in at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Agent endpoint; no endpoint means no agent is configured.
    pub endpoint: Option<String>,

    /// Bound on a single agent call in milliseconds.
    /// Default: 30000
    pub timeout_ms: u64,

    /// Negotiations allowed per failure episode beyond the first.
    /// Default: 1
    pub max_depth: u32,

    /// Step records sent as recent history.
    /// Default: 5
    pub history_window: usize,

    /// Longest corrective script accepted.
    /// Default: 10
    pub max_corrective_steps: usize,

    /// Reject corrective steps whose selectors rely on position only.
    /// Default: false
    pub strict_selectors: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 30_000,
            max_depth: 1,
            history_window: 5,
            max_corrective_steps: 10,
            strict_selectors: false,
        }
    }
}

impl RecoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for tests: short timeout, no endpoint.
    pub fn minimal() -> Self {
        Self {
            timeout_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint
            .as_deref()
            .map(|endpoint| !endpoint.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RecoveryConfig::default();
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(!config.has_endpoint());
        assert!(!RecoveryConfig::new().with_endpoint("  ").has_endpoint());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: RecoveryConfig =
            serde_json::from_value(serde_json::json!({"max_depth": 2, "endpoint": "http://agent"}))
                .unwrap();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.history_window, 5);
        assert!(config.has_endpoint());
    }
}
