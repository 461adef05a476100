pub mod check;
pub mod evaluate;
pub mod inspect;
pub mod prompt;

pub use check::{check, CheckArgs};
pub use evaluate::{evaluate, EvaluateArgs};
pub use inspect::{inspect, InspectArgs};
pub use prompt::{prompt, PromptArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use cardboard_editor::Document;
use std::path::Path;

/// Load a document file with the configured engine limits
pub(crate) fn load_document(path: &Path, config: &Config) -> Result<Document> {
    let doc = Document::load(path.to_path_buf())
        .with_context(|| format!("Cannot load document {}", path.display()))?;
    Ok(doc.with_engine_config(config.engine))
}
