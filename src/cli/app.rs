use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, load_local_env_overrides, LoadedConfig, LOCAL_ENV_PATH};

pub async fn run() -> Result<()> {
    let (applied, skipped) = load_local_env_overrides();
    let cli = CliArgs::parse();

    let LoadedConfig { config, path } = load_config(cli.config.as_ref()).await?;

    let level = config
        .logging
        .level
        .clone()
        .filter(|_| cli.log_level == "info")
        .unwrap_or_else(|| cli.log_level.clone());
    let format = cli.log_format.map(Into::into).unwrap_or(config.logging.format);
    init_logging(&level, cli.debug, format)?;

    info!(
        "Starting uiscript v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_DATE")
    );
    if !applied.is_empty() {
        info!(count = applied.len(), path = LOCAL_ENV_PATH, "Loaded local environment overrides");
    }
    for line in skipped {
        warn!(line, path = LOCAL_ENV_PATH, "Skipping malformed line in local env file");
    }
    match &path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }

    let cli_context = CliContext::new(config, path);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
