use super::load_document;
use crate::config::Config;
use anyhow::{bail, Result};
use cardboard_parser::{format_errors, parse};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Document JSON file
    pub input: PathBuf,
}

pub fn check(args: CheckArgs, config: &Config) -> Result<()> {
    let doc = load_document(&args.input, config)?;

    println!("🔍 {} {}", "Checking".green().bold(), args.input.display());

    let mut checked = 0;
    let mut failed = 0;

    for record in doc.snapshot().iter() {
        let Some(source) = record.rule.as_ref().and_then(|rule| rule.source()) else {
            continue;
        };
        checked += 1;

        match parse(source) {
            Ok(program) => {
                println!(
                    "  {} {} - {} statements",
                    "✓".green(),
                    record.id,
                    program.statements.len()
                );
            }
            Err(err) => {
                failed += 1;
                println!("  {} {}", "✗".red(), record.id);
                eprintln!("{}", format_errors(source, &format!("{}.js", record.id), &[err]));
            }
        }
    }

    println!();
    println!("   Rules checked: {}", checked);

    if failed > 0 {
        bail!("{} of {} rules failed to parse", failed, checked);
    }

    println!("✨ {} All rules parse", "Done".green().bold());
    Ok(())
}
