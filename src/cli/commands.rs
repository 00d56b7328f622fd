use clap::Subcommand;

use super::read_screen::ReadScreenArgs;
use super::resolve::ResolveArgs;
use super::run::RunArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a script against a fixture device
    Run(RunArgs),

    /// Check a script against the script schema
    Validate(ValidateArgs),

    /// Resolve a selector against a screen file
    Resolve(ResolveArgs),

    /// Render a screen file as read_screen would
    ReadScreen(ReadScreenArgs),
}
