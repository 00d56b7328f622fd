//! Application configuration
//!
//! One YAML document with a section per component. Every field has a
//! default, so an empty or partial file is valid.

use action_flow::EngineConfig;
use action_primitives::ExecutorConfig;
use agent_core::RecoveryConfig;
use anyhow::{Context, Result};
use perceiver_structural::StabilizePolicy;
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_AGENT_ENDPOINT: &str = "UISCRIPT_AGENT_ENDPOINT";
pub const ENV_AGENT_TIMEOUT_MS: &str = "UISCRIPT_AGENT_TIMEOUT_MS";
pub const ENV_RECOVERY_DEPTH: &str = "UISCRIPT_RECOVERY_DEPTH";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when neither `RUST_LOG` nor `--log-level` is given
    pub level: Option<String>,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub snapshot: StabilizePolicy,
    pub executor: ExecutorConfig,
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Failed to parse config file")
    }

    /// Apply `UISCRIPT_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(endpoint) = env::var(ENV_AGENT_ENDPOINT) {
            let endpoint = endpoint.trim();
            self.recovery.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());
        }
        if let Ok(timeout) = env::var(ENV_AGENT_TIMEOUT_MS) {
            self.recovery.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("{ENV_AGENT_TIMEOUT_MS} must be a number of milliseconds"))?;
        }
        if let Ok(depth) = env::var(ENV_RECOVERY_DEPTH) {
            self.recovery.max_depth = depth
                .trim()
                .parse()
                .with_context(|| format!("{ENV_RECOVERY_DEPTH} must be a non-negative integer"))?;
        }
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_recovery_depth: self.recovery.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(AppConfig::from_yaml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = AppConfig::from_yaml(
            r#"
executor:
  default_wait_timeout_ms: 750
recovery:
  endpoint: http://localhost:8080/recover
  max_depth: 2
logging:
  format: json
"#,
        )
        .unwrap();
        assert_eq!(config.executor.default_wait_timeout_ms, 750);
        assert_eq!(config.executor.poll_interval_ms, 100);
        assert_eq!(config.snapshot.stabilize_attempts, 3);
        assert_eq!(config.recovery.max_depth, 2);
        assert_eq!(config.recovery.timeout_ms, 30_000);
        assert_eq!(config.engine().max_recovery_depth, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(AppConfig::from_yaml("logging:\n  format: xml\n").is_err());
    }
}
