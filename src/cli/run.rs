//! `uiscript run`
//!
//! Steps:
//! 1. Load and validate the script, apply `--param` bindings
//! 2. Build the fixture device, executor and engine from configuration
//! 3. Attach a recovery agent (mock file, endpoint, or none)
//! 4. Run under a cancellation token tied to Ctrl-C and print the record

use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_flow::{
    validate_script, RunRecord, RunStatus, SchemaOptions, Script, ScriptEngine, ScriptRunner,
    StepResult,
};
use action_primitives::DefaultActionExecutor;
use agent_core::{MockRecoveryAgent, RecoveryOrchestrator};
use anyhow::{bail, Context, Result};
use clap::Args;
use perceiver_structural::Snapshotter;
use serde_json::Value;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::CliContext;
use super::fixtures::load_device;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Script file (.json, .yaml or .yml)
    pub script: PathBuf,

    /// Screen or device fixture file the script runs against
    #[arg(long, value_name = "FILE")]
    pub screens: PathBuf,

    /// JSON array of canned recovery responses, answered in order
    #[arg(long, value_name = "FILE", conflicts_with = "agent_endpoint")]
    pub mock_agent: Option<PathBuf>,

    /// Recovery agent endpoint; overrides the config file
    #[arg(long, value_name = "URL")]
    pub agent_endpoint: Option<String>,

    /// Recovery depth bound; overrides the config file
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Variable binding as key=value; JSON values are parsed, anything else is a string
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Reject selectors that rely on position only
    #[arg(long)]
    pub strict: bool,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let mut script = Script::load(&args.script)
        .with_context(|| format!("Failed to load script {}", args.script.display()))?;
    for param in &args.params {
        let (key, value) = parse_param(param)?;
        script = script.with_variable(key, value);
    }

    let errors = validate_script(
        &script,
        SchemaOptions {
            reject_positional: args.strict,
        },
    );
    if let Some(first) = errors.first() {
        for err in &errors {
            warn!(step = err.step(), "{}", err);
        }
        bail!(
            "Script {} failed validation with {} error(s); first: {}",
            args.script.display(),
            errors.len(),
            first
        );
    }

    let config = ctx.config();
    let mut recovery = config.recovery.clone();
    if let Some(endpoint) = &args.agent_endpoint {
        recovery = recovery.with_endpoint(endpoint.clone());
    }
    if let Some(depth) = args.max_depth {
        recovery = recovery.with_max_depth(depth);
    }
    let mut engine_config = config.engine();
    engine_config.max_recovery_depth = recovery.max_depth;

    let device = load_device(&args.screens).await?;
    let executor = DefaultActionExecutor::new(
        config.executor.clone(),
        Snapshotter::new(config.snapshot.clone()),
    );
    let mut engine = ScriptEngine::new(Arc::new(executor), engine_config);

    match &args.mock_agent {
        Some(path) => {
            let agent = load_mock_agent(path).await?;
            info!(path = %path.display(), "Using canned recovery responses");
            engine = engine.with_recovery(Arc::new(RecoveryOrchestrator::new(
                Arc::new(agent),
                recovery,
            )));
        }
        None => match RecoveryOrchestrator::from_config(recovery)? {
            Some(orchestrator) => {
                info!(
                    endpoint = orchestrator.config().endpoint.as_deref().unwrap_or_default(),
                    "Using HTTP recovery agent"
                );
                engine = engine.with_recovery(Arc::new(orchestrator));
            }
            None => info!("No recovery agent configured; failures abort the run"),
        },
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            interrupt.cancel();
        }
    });

    info!(
        script = %script.name,
        steps = script.len(),
        config = ?ctx.config_path(),
        "Running script"
    );
    let record = engine.run(&script, &device, cancel).await;
    emit(output, &record, render_record)?;

    if let Some(abort) = &record.abort {
        bail!(
            "Run {} aborted: {} ({})",
            record.run_id,
            abort.reason,
            abort.detail
        );
    }
    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --param '{raw}'; expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --param '{raw}'; empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn load_mock_agent(path: &Path) -> Result<MockRecoveryAgent> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read mock agent file {}", path.display()))?;
    let responses: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("Mock agent file {} must be a JSON array", path.display()))?;
    Ok(responses
        .into_iter()
        .fold(MockRecoveryAgent::new(), MockRecoveryAgent::with_response))
}

fn render_record(record: &RunRecord) -> String {
    let mut lines = vec![format!(
        "Run {} of '{}': {:?} in {} ms",
        record.run_id, record.script, record.status, record.duration_ms
    )];
    for step in &record.steps {
        let outcome = match &step.result {
            StepResult::Invalid { invalid } => format!("invalid ({invalid})"),
            result => match result.as_failure() {
                None => "ok".to_string(),
                Some(failure) => format!("{} ({})", failure.reason, failure.detail),
            },
        };
        let origin = match step.origin {
            action_flow::StepOrigin::Script => String::new(),
            action_flow::StepOrigin::Corrective { negotiation } => {
                format!(" [corrective #{negotiation}]")
            }
        };
        lines.push(format!(
            "  {:>3}. {}{}{} -> {}",
            step.index,
            step.action,
            step.selector
                .as_deref()
                .map(|s| format!(" {s}"))
                .unwrap_or_default(),
            origin,
            outcome
        ));
    }
    if !record.recoveries.is_empty() {
        lines.push(format!("  negotiations: {}", record.negotiations()));
    }
    if let Some(abort) = &record.abort {
        lines.push(format!("  aborted: {} ({})", abort.reason, abort.detail));
    } else if record.status == RunStatus::RecoveredAndCompleted {
        lines.push("  completed after recovery".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_parse_json_or_fall_back_to_text() {
        assert_eq!(parse_param("qty=3").unwrap(), ("qty".into(), json!(3)));
        assert_eq!(
            parse_param("name=Ada Lovelace").unwrap(),
            ("name".into(), json!("Ada Lovelace"))
        );
        assert_eq!(parse_param("flag=true").unwrap().1, json!(true));
        assert_eq!(parse_param("empty=").unwrap().1, json!(""));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
