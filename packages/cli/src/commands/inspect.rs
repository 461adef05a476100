use super::load_document;
use crate::config::Config;
use anyhow::Result;
use cardboard_editor::{Evaluation, ObjectId, ObjectStore};
use cardboard_model::ObjectRecord;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Document JSON file
    pub input: PathBuf,

    /// Show stored values instead of values after rules
    #[arg(long)]
    pub raw: bool,
}

pub fn inspect(args: InspectArgs, config: &Config) -> Result<()> {
    let mut doc = load_document(&args.input, config)?;

    let evaluation = if args.raw {
        Evaluation::empty(doc.snapshot())
    } else {
        doc.evaluate().clone()
    };

    let store = doc.snapshot();
    print_object(store, &evaluation, store.root_id(), 0)?;

    Ok(())
}

fn print_object(store: &ObjectStore, evaluation: &Evaluation, id: &ObjectId, depth: usize) -> Result<()> {
    let record = store.get(id)?;
    let indent = "  ".repeat(depth);

    let number = |key: &str| {
        evaluation
            .property(store, id, key)
            .and_then(|value| value.as_number())
            .unwrap_or(0.0)
    };

    if record.is_card() {
        println!(
            "{}{} {} {}{}",
            indent,
            "card".bright_blue(),
            id,
            format!(
                "@({}, {}) {}x{}",
                number("x"),
                number("y"),
                number("width"),
                number("height")
            )
            .dimmed(),
            copy_marker(record)
        );
    } else {
        let value = match evaluation.field_value(store, id) {
            Ok(value) => format!("{:?}", value.to_string()).normal(),
            Err(err) => err.to_string().red(),
        };
        let attribution = match evaluation.attribution(store, id, "value") {
            Some(rule_id) => format!(" ← {}", rule_id).cyan(),
            None => "".normal(),
        };
        println!(
            "{}{} {} = {}{}{}",
            indent,
            "field".green(),
            id,
            value,
            attribution,
            copy_marker(record)
        );
    }

    for child_id in &record.child_ids {
        print_object(store, evaluation, child_id, depth + 1)?;
    }

    Ok(())
}

fn copy_marker(record: &ObjectRecord) -> String {
    match &record.copy_of_id {
        Some(origin) => format!(" (copy of {})", origin).dimmed().to_string(),
        None => String::new(),
    }
}
