use std::path::PathBuf;

use action_flow::{validate_script, SchemaOptions, Script};
use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Script file (.json, .yaml or .yml)
    pub script: PathBuf,

    /// Reject selectors that rely on position only
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct ValidationIssue {
    step: usize,
    message: String,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    script: String,
    steps: usize,
    valid: bool,
    errors: Vec<ValidationIssue>,
}

pub async fn cmd_validate(args: ValidateArgs, output: OutputFormat) -> Result<()> {
    let script = Script::load(&args.script)
        .with_context(|| format!("Failed to load script {}", args.script.display()))?;
    let errors = validate_script(
        &script,
        SchemaOptions {
            reject_positional: args.strict,
        },
    );

    let report = ValidationReport {
        script: script.name.clone(),
        steps: script.len(),
        valid: errors.is_empty(),
        errors: errors
            .iter()
            .map(|err| ValidationIssue {
                step: err.step(),
                message: err.to_string(),
            })
            .collect(),
    };
    emit(output, &report, |report| {
        if report.valid {
            return format!("{}: valid ({} steps)", report.script, report.steps);
        }
        let mut lines = vec![format!(
            "{}: {} error(s)",
            report.script,
            report.errors.len()
        )];
        lines.extend(
            report
                .errors
                .iter()
                .map(|issue| format!("  step {}: {}", issue.step, issue.message)),
        );
        lines.join("\n")
    })?;

    if !report.valid {
        bail!("Script {} is invalid", args.script.display());
    }
    Ok(())
}
