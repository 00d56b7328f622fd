use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, LogFormat};

pub const LOCAL_ENV_PATH: &str = "config/local.env";

/// Apply `config/local.env` KEY=VALUE lines to the process environment
///
/// Variables that are already set win. Returns the keys applied and the
/// line numbers that could not be parsed.
pub fn load_local_env_overrides() -> (Vec<String>, Vec<usize>) {
    let path = Path::new(LOCAL_ENV_PATH);
    let Ok(contents) = stdfs::read_to_string(path) else {
        return (Vec::new(), Vec::new());
    };
    apply_env_lines(&contents)
}

fn apply_env_lines(contents: &str) -> (Vec<String>, Vec<usize>) {
    let mut applied = Vec::new();
    let mut skipped = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            skipped.push(idx + 1);
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var(key).is_ok() {
            continue;
        }
        env::set_var(key, unescape_value(value.trim()));
        applied.push(key.to_string());
    }
    (applied, skipped)
}

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    // Logs go to stderr so command output on stdout stays machine-readable.
    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the configuration was read from; `None` means defaults
    pub path: Option<PathBuf>,
}

/// Candidate config files in priority order
pub fn config_candidates(explicit: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.clone()];
    }
    let mut candidates = vec![PathBuf::from("config/uiscript.yaml")];
    if let Some(mut path) = dirs::config_dir() {
        path.push("uiscript");
        path.push("config.yaml");
        candidates.push(path);
    }
    candidates
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let found = config_candidates(config_path)
        .into_iter()
        .find(|candidate| candidate.exists());

    let mut loaded = match (found, config_path) {
        (Some(path), _) => {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            LoadedConfig {
                config: AppConfig::from_yaml(&content)
                    .with_context(|| format!("Invalid config file {}", path.display()))?,
                path: Some(path),
            }
        }
        (None, Some(explicit)) => {
            anyhow::bail!("Config file not found: {}", explicit.display())
        }
        (None, None) => LoadedConfig {
            config: AppConfig::default(),
            path: None,
        },
    };

    loaded.config.apply_env_overrides()?;
    Ok(loaded)
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_lines_skip_comments_and_existing_keys() {
        env::set_var("UISCRIPT_TEST_PRESET", "kept");
        let (applied, skipped) = apply_env_lines(
            "# comment\nUISCRIPT_TEST_FRESH=\"a b\"\nUISCRIPT_TEST_PRESET=lost\nnot a pair\n",
        );
        assert_eq!(applied, vec!["UISCRIPT_TEST_FRESH".to_string()]);
        assert_eq!(skipped, vec![4]);
        assert_eq!(env::var("UISCRIPT_TEST_FRESH").unwrap(), "a b");
        assert_eq!(env::var("UISCRIPT_TEST_PRESET").unwrap(), "kept");
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "executor:\n  default_scroll_attempts: 4").unwrap();
        let path = file.path().to_path_buf();

        let loaded = tokio_test::block_on(load_config(Some(&path))).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.executor.default_scroll_attempts, 4);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = PathBuf::from("/nonexistent/uiscript.yaml");
        assert!(tokio_test::block_on(load_config(Some(&path))).is_err());
    }
}
