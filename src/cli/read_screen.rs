use std::path::PathBuf;

use action_locator::Selector;
use action_primitives::{
    ActionExecutor, ActionRequest, DefaultActionExecutor, ExecCtx, ExecutionResult, FixtureDevice,
    ReadFormat,
};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use perceiver_structural::Snapshotter;
use tokio_util::sync::CancellationToken;
use uiscript_core_types::RunId;

use super::context::CliContext;
use super::fixtures::load_fixture;
use super::output::{emit, OutputFormat};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScreenFormat {
    Full,
    Summary,
    Targeted,
}

#[derive(Args, Clone, Debug)]
pub struct ReadScreenArgs {
    /// Screen or device fixture file
    #[arg(long, value_name = "FILE")]
    pub screen: PathBuf,

    /// Representation to render
    #[arg(long, value_enum, default_value = "summary")]
    pub format: ScreenFormat,

    /// Selector whose matches root the targeted representation
    #[arg(long, required_if_eq("format", "targeted"))]
    pub selector: Option<String>,

    /// Screen to render when the file declares several
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

pub async fn cmd_read_screen(
    args: ReadScreenArgs,
    ctx: &CliContext,
    output: OutputFormat,
) -> Result<()> {
    let format = match args.format {
        ScreenFormat::Full => ReadFormat::Full,
        ScreenFormat::Summary => ReadFormat::Summary,
        ScreenFormat::Targeted => {
            let text = args.selector.as_deref().unwrap_or_default();
            let selector = Selector::parse(text)
                .with_context(|| format!("Invalid selector '{text}'"))?;
            ReadFormat::Targeted(selector)
        }
    };

    let spec = load_fixture(&args.screen).await?;
    if args.index >= spec.screens.len() {
        bail!(
            "Screen index {} out of range; {} declares {} screen(s)",
            args.index,
            args.screen.display(),
            spec.screens.len()
        );
    }
    let device = FixtureDevice::from_spec(spec);
    device.set_cursor(args.index);

    let config = ctx.config();
    let executor = DefaultActionExecutor::new(
        config.executor.clone(),
        Snapshotter::new(config.snapshot.clone()),
    );
    let exec_ctx = ExecCtx::new(RunId::new(), CancellationToken::new());
    let result = executor
        .execute(&exec_ctx, &device, &ActionRequest::ReadScreen { format })
        .await;

    match result {
        ExecutionResult::Success { value } => {
            let value = value.unwrap_or_default();
            emit(output, &value, |value| {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            })
        }
        ExecutionResult::Failure(failure) => {
            bail!("read_screen failed: {} ({})", failure.reason, failure.detail)
        }
    }
}
