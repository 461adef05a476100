//! # Cardboard Editor
//!
//! Document editing engine for Cardboard whiteboards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ renderer: emits intents (Mutation)          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document lifecycle + mutations      │
//! │  - Load/save documents                      │
//! │  - Apply mutations with validation          │
//! │  - Pin snapshots as rule baselines          │
//! │  - Rule synthesis flow                      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ evaluator: rules → override layer           │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cardboard_editor::{Document, Mutation};
//!
//! let mut doc = Document::load("board.json".into())?;
//!
//! doc.apply(Mutation::SetFieldValue {
//!     field_id: "field-1".into(),
//!     value: "42".to_string(),
//! })?;
//!
//! let evaluation = doc.evaluate();
//! for exception in evaluation.exceptions() {
//!     println!("{} kept {}", exception.object_id, exception.expected_value);
//! }
//!
//! doc.save()?;
//! ```

mod document;
mod errors;
mod mutations;
mod synthesis;

pub use document::{Document, DocumentStorage};
pub use errors::EditorError;
pub use mutations::{Mutation, MutationError, MutationResult};
pub use synthesis::{
    build_prompt, extract_code_block, RuleSynthesizer, SynthesisOutcome, SynthesisRequest,
};

// Re-export common types for convenience
pub use cardboard_evaluator::{Evaluation, RuleEngine};
pub use cardboard_model::{ObjectId, ObjectKind, ObjectStore, Value};
