use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Print `value` in the requested format; `human` renders the human form
pub fn emit<T, F>(format: OutputFormat, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let text = match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("Failed to encode output as JSON")?
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to encode output as YAML")?,
    };
    println!("{}", text.trim_end());
    Ok(())
}
