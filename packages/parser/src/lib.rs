pub mod ast;
pub mod error;
pub mod parser;
pub mod tokenizer;

pub use error::{ParseError, ParseResult};
pub use parser::{parse, parse_expression, Parser};
pub use tokenizer::{tokenize, Token};

#[cfg(feature = "pretty-errors")]
pub use error::format_errors;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_basic() {
        let tokens = tokenize("addRule(fn)").unwrap();
        assert_eq!(tokens.len(), 4);
    }

    #[cfg(feature = "pretty-errors")]
    #[test]
    fn test_format_errors_mentions_file() {
        let source = "const = 1";
        let err = parse(source).unwrap_err();
        let output = format_errors(source, "rule.js", &[err]);
        assert!(output.contains("rule.js"));
        assert!(output.contains("expected identifier"));
    }
}
