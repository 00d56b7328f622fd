use super::env::CliArgs;
use super::read_screen::cmd_read_screen;
use super::resolve::cmd_resolve;
use super::run::cmd_run;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, cli.output).await,
        Commands::Validate(args) => cmd_validate(args, cli.output).await,
        Commands::Resolve(args) => cmd_resolve(args, cli.output).await,
        Commands::ReadScreen(args) => cmd_read_screen(args, ctx, cli.output).await,
    }
}
