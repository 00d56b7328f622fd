use std::path::PathBuf;

use action_locator::{DefaultElementResolver, ElementResolver, Selector, SelectorStability};
use anyhow::{Context, Result};
use clap::Args;
use perceiver_structural::SummaryEntry;
use serde::Serialize;

use super::fixtures::load_snapshot;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Selector text, e.g. "role=button && text=Save"
    pub selector: String,

    /// Screen or device fixture file
    #[arg(long, value_name = "FILE")]
    pub screen: PathBuf,

    /// Screen to use when the file declares several
    #[arg(long, default_value_t = 0)]
    pub index: usize,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    selector: String,
    positional: bool,
    /// Alternative that matched; 0 is the primary predicate
    alternative: Option<usize>,
    matches: Vec<SummaryEntry>,
}

pub async fn cmd_resolve(args: ResolveArgs, output: OutputFormat) -> Result<()> {
    let selector = Selector::parse(&args.selector)
        .with_context(|| format!("Invalid selector '{}'", args.selector))?;
    let snapshot = load_snapshot(&args.screen, args.index).await?;
    let resolution = DefaultElementResolver.resolve(&selector, &snapshot);

    let report = ResolveReport {
        selector: selector.to_string(),
        positional: selector.stability() == SelectorStability::Positional,
        alternative: resolution.alternative,
        matches: resolution
            .matches
            .iter()
            .filter_map(|index| snapshot.get(*index))
            .map(SummaryEntry::from)
            .collect(),
    };
    emit(output, &report, |report| {
        let mut lines = vec![format!(
            "{} -> {} match(es){}",
            report.selector,
            report.matches.len(),
            if report.positional { " [positional]" } else { "" }
        )];
        if let Some(alternative) = report.alternative.filter(|alt| *alt > 0) {
            lines.push(format!("  matched fallback #{alternative}"));
        }
        lines.extend(report.matches.iter().map(|entry| {
            format!(
                "  {} {} {} {}",
                entry.id,
                entry.role,
                entry.text.as_deref().unwrap_or("-"),
                entry.bounds
            )
        }));
        lines.join("\n")
    })
}
