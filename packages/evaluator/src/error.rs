use cardboard_model::ObjectId;
use cardboard_parser::ast::Span;
use cardboard_parser::ParseError;
use thiserror::Error;

pub type RuleResult<T> = Result<T, RuleError>;

/// Failure while running a rule body, a rule callback or a formula.
///
/// Rule errors are caught per rule and recorded on its outcome; they never
/// abort the evaluation of other rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("'{name}' is not defined at {}..{}", span.start, span.end)]
    UnknownIdentifier { name: String, span: Span },

    #[error("Type error at {}..{}: {message}", span.start, span.end)]
    TypeError { message: String, span: Span },

    #[error("Invalid operands for operator {operator} at {}..{}: {details}", span.start, span.end)]
    InvalidOperands {
        operator: String,
        details: String,
        span: Span,
    },

    #[error("Value is not callable at {}..{}", span.start, span.end)]
    NotCallable { span: Span },

    #[error("Division by zero at {}..{}", span.start, span.end)]
    DivisionByZero { span: Span },

    #[error("Maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("Step limit of {limit} exceeded")]
    StepLimitExceeded { limit: usize },

    #[error("Object not found: {0}")]
    UnknownObject(ObjectId),

    #[error("Formula cycle through field {0}")]
    FormulaCycle(ObjectId),
}

impl RuleError {
    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            RuleError::Parse(err) => err.span(),
            RuleError::UnknownIdentifier { span, .. }
            | RuleError::TypeError { span, .. }
            | RuleError::InvalidOperands { span, .. }
            | RuleError::NotCallable { span }
            | RuleError::DivisionByZero { span } => Some(*span),
            RuleError::CallDepthExceeded { .. }
            | RuleError::StepLimitExceeded { .. }
            | RuleError::UnknownObject(_)
            | RuleError::FormulaCycle(_) => None,
        }
    }
}
