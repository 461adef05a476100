use crate::ast::Span;
use crate::error::{ParseError, ParseResult};
use logos::Logos;
use std::fmt;

/// Token types for the rule language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum Token<'src> {
    // Keywords
    #[token("const")]
    Const,

    #[token("let")]
    Let,

    #[token("var")]
    Var,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("return")]
    Return,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[token("undefined")]
    Undefined,

    // Literals
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice())]
    Ident(&'src str),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| strip_quotes(lex.slice()))]
    #[regex(r"'([^'\\]|\\.)*'", |lex| strip_quotes(lex.slice()))]
    String(&'src str),

    /// Raw template body between backticks, interpolations unparsed
    #[regex(r"`([^`\\]|\\.)*`", |lex| strip_quotes(lex.slice()))]
    Template(&'src str),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    #[regex(r"\.[0-9]+", |lex| lex.slice())]
    Number(&'src str),

    // Punctuation
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(".")]
    Dot,

    #[token("?")]
    Question,

    #[token("=>")]
    Arrow,

    // Operators
    #[token("=")]
    Equals,

    #[token("==")]
    EqualsEquals,

    #[token("===")]
    StrictEquals,

    #[token("!=")]
    NotEquals,

    #[token("!==")]
    StrictNotEquals,

    #[token("<")]
    LessThan,

    #[token("<=")]
    LessThanEquals,

    #[token(">")]
    GreaterThan,

    #[token(">=")]
    GreaterThanEquals,

    #[token("&&")]
    And,

    #[token("||")]
    Or,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,
}

fn strip_quotes(s: &str) -> &str {
    &s[1..s.len() - 1]
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Const => write!(f, "keyword 'const'"),
            Token::Let => write!(f, "keyword 'let'"),
            Token::Var => write!(f, "keyword 'var'"),
            Token::If => write!(f, "keyword 'if'"),
            Token::Else => write!(f, "keyword 'else'"),
            Token::Return => write!(f, "keyword 'return'"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Undefined => write!(f, "undefined"),
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::String(s) => write!(f, "string \"{}\"", s),
            Token::Template(s) => write!(f, "template `{}`", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
            Token::Semicolon => write!(f, "';'"),
            Token::Colon => write!(f, "':'"),
            Token::Dot => write!(f, "'.'"),
            Token::Question => write!(f, "'?'"),
            Token::Arrow => write!(f, "'=>'"),
            Token::Equals => write!(f, "'='"),
            Token::EqualsEquals => write!(f, "'=='"),
            Token::StrictEquals => write!(f, "'==='"),
            Token::NotEquals => write!(f, "'!='"),
            Token::StrictNotEquals => write!(f, "'!=='"),
            Token::LessThan => write!(f, "'<'"),
            Token::LessThanEquals => write!(f, "'<='"),
            Token::GreaterThan => write!(f, "'>'"),
            Token::GreaterThanEquals => write!(f, "'>='"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Bang => write!(f, "'!'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
        }
    }
}

/// Tokenize a source string, failing on the first unrecognized character
pub fn tokenize(source: &str) -> ParseResult<Vec<(Token<'_>, Span)>> {
    tokenize_at(source, 0)
}

/// Tokenize a fragment that starts at `offset` in the enclosing source
pub fn tokenize_at(source: &str, offset: usize) -> ParseResult<Vec<(Token<'_>, Span)>> {
    Token::lexer(source)
        .spanned()
        .map(|(result, range)| {
            let span = Span::new(range.start + offset, range.end + offset);
            match result {
                Ok(token) => Ok((token, span)),
                Err(_) => Err(ParseError::LexError {
                    span,
                    message: format!("Unexpected character '{}'", &source[range]),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = kinds("const knob = getNode");
        assert_eq!(
            tokens,
            vec![
                Token::Const,
                Token::Ident("knob"),
                Token::Equals,
                Token::Ident("getNode")
            ]
        );
    }

    #[test]
    fn test_strings_and_templates() {
        let tokens = kinds(r#""card1" 'field1' `${a} px`"#);
        assert_eq!(tokens[0], Token::String("card1"));
        assert_eq!(tokens[1], Token::String("field1"));
        assert_eq!(tokens[2], Token::Template("${a} px"));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.14 .5 1e3");
        assert_eq!(
            tokens,
            vec![
                Token::Number("42"),
                Token::Number("3.14"),
                Token::Number(".5"),
                Token::Number("1e3")
            ]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        let tokens = kinds("=== !== == = => >=");
        assert_eq!(
            tokens,
            vec![
                Token::StrictEquals,
                Token::StrictNotEquals,
                Token::EqualsEquals,
                Token::Equals,
                Token::Arrow,
                Token::GreaterThanEquals
            ]
        );
    }

    #[test]
    fn test_comments_ignored() {
        let source = r#"
            // leading comment
            addRule(/* inline */ fn)
            /* multi
               line */
        "#;
        assert_eq!(
            kinds(source),
            vec![
                Token::Ident("addRule"),
                Token::LParen,
                Token::Ident("fn"),
                Token::RParen
            ]
        );
    }

    #[test]
    fn test_spans_with_offset() {
        let tokens = tokenize_at("a + b", 10).unwrap();
        assert_eq!(tokens[0].1, Span::new(10, 11));
        assert_eq!(tokens[2].1, Span::new(14, 15));
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        let result = tokenize("a # b");
        assert!(matches!(result, Err(ParseError::LexError { .. })));
    }
}
