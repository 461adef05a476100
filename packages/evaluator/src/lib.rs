//! Rule engine for Cardboard documents.
//!
//! Rules are small scripts attached to fields. Running them produces an
//! [`Evaluation`]: an override layer of computed property values, plus the
//! exceptions raised where a computed value would overwrite a manual edit.

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod interpreter;
pub mod ops;
pub mod value;

pub use config::EngineConfig;
pub use engine::{Evaluation, RuleEngine, RuleOutcome};
pub use error::{RuleError, RuleResult};
pub use value::{Builtin, RuntimeValue};
