use super::load_document;
use crate::config::Config;
use anyhow::{anyhow, Result};
use cardboard_editor::{build_prompt, ObjectId};
use cardboard_model::to_prompt_xml;
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PromptArgs {
    /// Document JSON file
    pub input: PathBuf,

    /// Field the rule is for; the card it sits on is the example
    pub field: String,

    /// What the example card shows
    pub explanation: String,
}

pub fn prompt(args: PromptArgs, config: &Config) -> Result<()> {
    let doc = load_document(&args.input, config)?;
    let field_id = ObjectId::from(args.field.as_str());

    let record = doc.snapshot().get(&field_id)?;
    if !record.is_field() {
        return Err(anyhow!("{} is a {}, not a field", field_id, record.kind));
    }
    let card_id = record
        .parent_id
        .as_ref()
        .ok_or_else(|| anyhow!("Field {} is not on a card", field_id))?;

    let xml = to_prompt_xml(doc.snapshot(), card_id)?;
    print!("{}", build_prompt(&args.explanation, &xml));

    Ok(())
}
