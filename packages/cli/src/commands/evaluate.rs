use super::load_document;
use crate::config::Config;
use anyhow::{bail, Result};
use cardboard_editor::Evaluation;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Document JSON file
    pub input: PathBuf,

    /// Save recorded exceptions back into the document
    #[arg(short, long)]
    pub write: bool,

    /// Fail when any rule raised an error
    #[arg(long)]
    pub strict: bool,
}

pub fn evaluate(args: EvaluateArgs, config: &Config) -> Result<()> {
    let mut doc = load_document(&args.input, config)?;

    println!(
        "{} {} (version {})",
        "⚙️  Evaluating".bright_blue().bold(),
        args.input.display(),
        doc.version()
    );

    let evaluation = doc.evaluate().clone();
    print_outcomes(&evaluation);

    let error_count = evaluation.errors().count();
    let exception_count = evaluation.exceptions().count();

    println!();
    if error_count == 0 {
        println!(
            "{} {} rules, {} exceptions",
            "✅".green(),
            evaluation.outcomes().len(),
            exception_count
        );
    } else {
        println!(
            "{} {} rules, {} exceptions, {} errors",
            "⚠️".yellow(),
            evaluation.outcomes().len(),
            exception_count,
            error_count
        );
    }

    if (args.write || config.write_exceptions) && doc.is_dirty() {
        doc.save()?;
        println!("{} {}", "💾 Saved".green(), args.input.display());
    }

    if args.strict && error_count > 0 {
        bail!("{} rule errors", error_count);
    }

    Ok(())
}

fn print_outcomes(evaluation: &Evaluation) {
    if evaluation.outcomes().is_empty() {
        println!("{}", "No rules found".yellow());
        return;
    }

    for outcome in evaluation.outcomes() {
        let marker = if outcome.errors.is_empty() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} {} - {} callbacks, {} writes",
            marker,
            outcome.field_id,
            format!("({})", outcome.rule_id).dimmed(),
            outcome.callbacks,
            outcome.writes
        );

        for exception in &outcome.exceptions {
            println!(
                "      {} {}.{} kept {} (computed {})",
                "exception".yellow(),
                exception.object_id,
                exception.key,
                exception.expected_value,
                exception.computed_value
            );
        }

        for err in &outcome.errors {
            println!("      {} {}", "error".red(), err.to_string().red());
        }
    }
}
