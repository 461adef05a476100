use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize_at, Token};

/// Recursive-descent parser for rule sources
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
    span: Span,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        Self::with_offset(source, 0)
    }

    /// Parser over a fragment located at `offset` in an enclosing source,
    /// so spans of template interpolations point into the original text
    fn with_offset(source: &'src str, offset: usize) -> ParseResult<Self> {
        Ok(Self {
            source,
            tokens: tokenize_at(source, offset)?,
            pos: 0,
            span: Span::new(offset, offset + source.len()),
        })
    }

    /// Parse a complete rule source
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if self.match_token(Token::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }

        Ok(Program {
            statements,
            span: self.span,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.peek() {
            Some((Token::Const, _)) | Some((Token::Let, _)) | Some((Token::Var, _)) => {
                self.parse_declaration()
            }
            Some((Token::If, _)) => self.parse_if(),
            Some((Token::Return, _)) => self.parse_return(),
            Some((Token::LBrace, _)) => {
                let start = self.peek_span();
                let statements = self.parse_block()?;
                Ok(Statement::Block {
                    statements,
                    span: start.to(self.previous_span()),
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `const name = value`, `let name = value`, `let name`
    fn parse_declaration(&mut self) -> ParseResult<Statement> {
        let start = self.peek_span();
        let mutable = !self.check(Token::Const);
        self.advance();

        let name = self.expect_ident()?;
        let value = if self.match_token(Token::Equals) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        if !mutable && value.is_none() {
            return Err(ParseError::invalid_syntax(
                start.to(self.previous_span()),
                "Missing initializer in const declaration",
            ));
        }

        self.match_token(Token::Semicolon);
        Ok(Statement::Let {
            name,
            value,
            mutable,
            span: start.to(self.previous_span()),
        })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let start = self.peek_span();
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;

        let then_branch = self.parse_branch()?;
        let else_branch = if self.match_token(Token::Else) {
            if self.check(Token::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_branch()?)
            }
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            span: start.to(self.previous_span()),
        })
    }

    /// Either a braced block or a single statement
    fn parse_branch(&mut self) -> ParseResult<Vec<Statement>> {
        if self.check(Token::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let start = self.peek_span();
        self.expect(Token::Return)?;

        let value = if self.is_at_end()
            || self.check(Token::Semicolon)
            || self.check(Token::RBrace)
            || self.line_break_ahead()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.match_token(Token::Semicolon);
        Ok(Statement::Return {
            value,
            span: start.to(self.previous_span()),
        })
    }

    /// Whether a newline separates the previous token from the next one
    fn line_break_ahead(&self) -> bool {
        let Some((_, next)) = self.peek() else {
            return false;
        };
        let start = self.previous_span().end.saturating_sub(self.span.start);
        let end = next.start.saturating_sub(self.span.start);
        self.source
            .get(start..end)
            .map_or(false, |gap| gap.contains('\n'))
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(Token::LBrace)?;

        let mut statements = Vec::new();
        while !self.check(Token::RBrace) {
            if self.is_at_end() {
                return Err(ParseError::unexpected_eof("'}'"));
            }
            if self.match_token(Token::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }

        self.expect(Token::RBrace)?;
        Ok(statements)
    }

    /// Expression statement, or an assignment if followed by `=`
    fn parse_expression_statement(&mut self) -> ParseResult<Statement> {
        let expression = self.parse_expression()?;

        if self.match_token(Token::Equals) {
            if !expression.is_assignable() {
                return Err(ParseError::invalid_syntax(
                    expression.span(),
                    "Invalid assignment target",
                ));
            }

            let value = self.parse_expression()?;
            let span = expression.span().to(value.span());
            self.match_token(Token::Semicolon);
            return Ok(Statement::Assign {
                target: expression,
                value,
                span,
            });
        }

        let span = expression.span();
        self.match_token(Token::Semicolon);
        Ok(Statement::Expression { expression, span })
    }

    /// Parse an expression with full operator precedence
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        if self.is_arrow_ahead() {
            return self.parse_arrow();
        }
        self.parse_conditional_expression()
    }

    /// `x => body` or `(a, b) => body`
    fn parse_arrow(&mut self) -> ParseResult<Expression> {
        let start = self.peek_span();

        let params = if self.match_token(Token::LParen) {
            let mut params = Vec::new();
            while !self.check(Token::RParen) {
                params.push(self.expect_ident()?);
                if !self.match_token(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RParen)?;
            params
        } else {
            vec![self.expect_ident()?]
        };

        self.expect(Token::Arrow)?;

        let body = if self.check(Token::LBrace) {
            ArrowBody::Block(self.parse_block()?)
        } else {
            ArrowBody::Expression(Box::new(self.parse_expression()?))
        };

        Ok(Expression::Arrow {
            params,
            body,
            span: start.to(self.previous_span()),
        })
    }

    /// Parse ternary expression (lowest precedence after arrows)
    fn parse_conditional_expression(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_or_expression()?;

        if !self.match_token(Token::Question) {
            return Ok(condition);
        }

        let consequent = self.parse_expression()?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_expression()?;
        let span = condition.span().to(alternate.span());

        Ok(Expression::Conditional {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    /// Parse OR expression
    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.match_token(Token::Or) {
            let right = self.parse_and_expression()?;
            left = binary(left, BinaryOp::Or, right);
        }

        Ok(left)
    }

    /// Parse AND expression
    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_equality_expression()?;

        while self.match_token(Token::And) {
            let right = self.parse_equality_expression()?;
            left = binary(left, BinaryOp::And, right);
        }

        Ok(left)
    }

    /// Parse equality expression (== != === !==)
    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison_expression()?;

        while let Some(op) = self.match_equality_op() {
            let right = self.parse_comparison_expression()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// Parse comparison expression (< > <= >=)
    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        while let Some(op) = self.match_comparison_op() {
            let right = self.parse_additive_expression()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// Parse additive expression (+ -)
    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        while let Some(op) = self.match_additive_op() {
            let right = self.parse_multiplicative_expression()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// Parse multiplicative expression (* / %)
    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        while let Some(op) = self.match_multiplicative_op() {
            let right = self.parse_unary_expression()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    /// Parse prefix operators (! - +)
    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_span();

        let operator = if self.match_token(Token::Bang) {
            Some(UnaryOp::Not)
        } else if self.match_token(Token::Minus) {
            Some(UnaryOp::Negate)
        } else if self.match_token(Token::Plus) {
            Some(UnaryOp::Plus)
        } else {
            None
        };

        match operator {
            Some(operator) => {
                let operand = self.parse_unary_expression()?;
                let span = start.to(operand.span());
                Ok(Expression::Unary {
                    operator,
                    operand: Box::new(operand),
                    span,
                })
            }
            None => self.parse_postfix_expression(),
        }
    }

    /// Parse member access, indexing and calls: `a.b`, `a[0]`, `a.b(c)(d)`
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            if self.match_token(Token::Dot) {
                let property = self.expect_ident()?;
                let span = expr.span().to(self.previous_span());
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                    span,
                };
            } else if self.match_token(Token::LParen) {
                let arguments = self.parse_arguments()?;
                let span = expr.span().to(self.previous_span());
                expr = Expression::Call {
                    callee: Box::new(expr),
                    arguments,
                    span,
                };
            } else if self.match_token(Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(Token::RBracket)?;
                let span = expr.span().to(self.previous_span());
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Arguments after an already consumed `(`
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut arguments = Vec::new();

        while !self.check(Token::RParen) && !self.is_at_end() {
            arguments.push(self.parse_expression()?);

            if !self.match_token(Token::Comma) {
                break;
            }
        }

        self.expect(Token::RParen)?;
        Ok(arguments)
    }

    /// Parse primary expression (literals, identifiers, groups, arrays)
    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let Some((token, span)) = self.peek().cloned() else {
            return Err(ParseError::unexpected_eof("expression"));
        };

        match token {
            Token::Number(n) => {
                self.advance();
                let value = n.parse::<f64>().map_err(|_| {
                    ParseError::invalid_syntax(span, format!("Invalid number '{}'", n))
                })?;
                Ok(Expression::Number { value, span })
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::String {
                    value: unescape(s),
                    span,
                })
            }
            Token::Template(raw) => {
                self.advance();
                self.parse_template_string(raw, span)
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expression::Boolean {
                    value: token == Token::True,
                    span,
                })
            }
            Token::Null | Token::Undefined => {
                self.advance();
                Ok(Expression::Null { span })
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expression::Identifier {
                    name: name.to_string(),
                    span,
                })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(Token::RBracket) && !self.is_at_end() {
                    elements.push(self.parse_expression()?);
                    if !self.match_token(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expression::Array {
                    elements,
                    span: span.to(self.previous_span()),
                })
            }
            other => Err(ParseError::unexpected_token(
                span,
                "expression",
                other.to_string(),
            )),
        }
    }

    /// Parse a backtick template with `${...}` interpolation
    fn parse_template_string(&self, raw: &'src str, span: Span) -> ParseResult<Expression> {
        // Body starts after the opening backtick
        let base = span.start + 1;
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.char_indices().peekable();

        while let Some((i, ch)) = chars.next() {
            if ch == '$' && matches!(chars.peek(), Some((_, '{'))) {
                chars.next();

                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }

                let expr_start = i + 2;
                let mut depth = 1;
                let mut expr_end = None;
                for (j, c) in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                expr_end = Some(j);
                                break;
                            }
                        }
                        _ => {}
                    }
                }

                let expr_end = expr_end.ok_or_else(|| {
                    ParseError::invalid_syntax(span, "Unterminated template interpolation")
                })?;

                let mut sub_parser = Parser::with_offset(&raw[expr_start..expr_end], base + expr_start)?;
                let expr = sub_parser.parse_expression()?;
                if let Some((token, token_span)) = sub_parser.peek() {
                    return Err(ParseError::unexpected_token(
                        *token_span,
                        "'}'",
                        token.to_string(),
                    ));
                }
                parts.push(TemplatePart::Expression(expr));
            } else if ch == '\\' {
                if let Some((_, next)) = chars.next() {
                    literal.push(unescape_char(next));
                }
            } else {
                literal.push(ch);
            }
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        Ok(Expression::Template { parts, span })
    }

    /// Whether the upcoming tokens start an arrow function
    fn is_arrow_ahead(&self) -> bool {
        match self.peek() {
            Some((Token::Ident(_), _)) => matches!(self.peek_ahead(1), Some((Token::Arrow, _))),
            Some((Token::LParen, _)) => {
                let mut depth = 0usize;
                let mut offset = 0;
                while let Some((token, _)) = self.peek_ahead(offset) {
                    match token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(self.peek_ahead(offset + 1), Some((Token::Arrow, _)));
                            }
                        }
                        _ => {}
                    }
                    offset += 1;
                }
                false
            }
            _ => false,
        }
    }

    // Helper methods for matching operators

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::StrictEquals) {
            Some(BinaryOp::StrictEquals)
        } else if self.match_token(Token::StrictNotEquals) {
            Some(BinaryOp::StrictNotEquals)
        } else if self.match_token(Token::EqualsEquals) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Token::NotEquals) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_comparison_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::LessThanEquals) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Token::GreaterThanEquals) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Token::LessThan) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Token::GreaterThan) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Token::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Token::Slash) {
            Some(BinaryOp::Divide)
        } else if self.match_token(Token::Percent) {
            Some(BinaryOp::Modulo)
        } else {
            None
        }
    }

    // Helper methods

    fn peek(&self) -> Option<&(Token<'src>, Span)> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&(Token<'src>, Span)> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, Span)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            return Ok(());
        }

        match self.peek() {
            Some((found, span)) => Err(ParseError::unexpected_token(
                *span,
                token.to_string(),
                found.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(token.to_string())),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some((Token::Ident(s), _)) => {
                let val = s.to_string();
                self.advance();
                Ok(val)
            }
            Some((found, span)) => Err(ParseError::unexpected_token(
                *span,
                "identifier",
                found.to_string(),
            )),
            None => Err(ParseError::unexpected_eof("identifier")),
        }
    }

    /// Span of the next token, or an empty span at the end of input
    fn peek_span(&self) -> Span {
        self.peek()
            .map(|(_, span)| *span)
            .unwrap_or(Span::new(self.span.end, self.span.end))
    }

    /// Span of the token just consumed
    fn previous_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, span)| *span)
            .unwrap_or(Span::new(self.span.start, self.span.start))
    }
}

fn binary(left: Expression, operator: BinaryOp, right: Expression) -> Expression {
    let span = left.span().to(right.span());
    Expression::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        span,
    }
}

fn unescape_char(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(unescape_char(next));
            }
        } else {
            out.push(c);
        }
    }

    out
}

/// Parse a rule source into a program
pub fn parse(source: &str) -> ParseResult<Program> {
    Parser::new(source)?.parse_program()
}

/// Parse a standalone expression, such as a field formula
pub fn parse_expression(source: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(source)?;
    let expression = parser.parse_expression()?;

    if let Some((token, span)) = parser.peek() {
        return Err(ParseError::unexpected_token(
            *span,
            "end of expression",
            token.to_string(),
        ));
    }

    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression(source: &str) -> Expression {
        parse_expression(source).unwrap()
    }

    #[test]
    fn test_parse_slider_rule() {
        let source = r#"
            const exampleSlider = getNode("card1")
            const exampleKnob = getNode("card2")
            const exampleField = getNode("field1")

            addRule((obj) => {
              const field = obj
              if (!field.isCopyOf(exampleField)) {
                return
              }

              const knob = field.parent
              if (!knob || !knob.isCopyOf(exampleKnob)) {
                return
              }

              field.props.value = (knob.props.x + knob.props.width / 2) / slider.props.width * 100
            })
        "#;

        let program = parse(source).unwrap();
        assert_eq!(program.statements.len(), 4);

        let Statement::Expression { expression, .. } = &program.statements[3] else {
            panic!("Expected addRule call");
        };
        let Expression::Call { arguments, .. } = expression else {
            panic!("Expected call");
        };
        let Expression::Arrow { params, body, .. } = &arguments[0] else {
            panic!("Expected arrow");
        };
        assert_eq!(params, &vec!["obj".to_string()]);

        let ArrowBody::Block(statements) = body else {
            panic!("Expected block body");
        };
        assert!(matches!(statements.last(), Some(Statement::Assign { .. })));
    }

    #[test]
    fn test_precedence() {
        let Expression::Binary { operator, right, .. } = expression("1 + 2 * 3") else {
            panic!("Expected binary");
        };
        assert_eq!(operator, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expression::Binary {
                operator: BinaryOp::Multiply,
                ..
            }
        ));

        let Expression::Binary { operator, .. } = expression("a || b && c") else {
            panic!("Expected binary");
        };
        assert_eq!(operator, BinaryOp::Or);
    }

    #[test]
    fn test_ternary_and_unary() {
        let expr = expression("!a ? -1 : b === null");
        let Expression::Conditional {
            condition,
            consequent,
            alternate,
            ..
        } = expr
        else {
            panic!("Expected conditional");
        };
        assert!(matches!(*condition, Expression::Unary { operator: UnaryOp::Not, .. }));
        assert!(matches!(*consequent, Expression::Unary { operator: UnaryOp::Negate, .. }));
        assert!(matches!(
            *alternate,
            Expression::Binary {
                operator: BinaryOp::StrictEquals,
                ..
            }
        ));
    }

    #[test]
    fn test_method_calls_and_index() {
        let expr = expression("obj.children()[0].props.value");
        let Expression::Member { object, property, .. } = expr else {
            panic!("Expected member");
        };
        assert_eq!(property, "value");
        assert!(matches!(*object, Expression::Member { .. }));
    }

    #[test]
    fn test_arrow_forms() {
        assert!(matches!(expression("x => x * 2"), Expression::Arrow { .. }));
        assert!(matches!(expression("(a, b) => a + b"), Expression::Arrow { .. }));
        assert!(matches!(expression("() => {}"), Expression::Arrow { .. }));
        // A parenthesized expression is not an arrow
        assert!(matches!(expression("(a + b) * 2"), Expression::Binary { .. }));
    }

    #[test]
    fn test_template_interpolation() {
        let expr = expression("`${a}px of ${b + 1}`");
        let Expression::Template { parts, .. } = expr else {
            panic!("Expected template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], TemplatePart::Literal("px of ".to_string()));

        let TemplatePart::Expression(inner) = &parts[2] else {
            panic!("Expected interpolation");
        };
        // `b` sits at byte 13 of the source
        assert_eq!(inner.span().start, 13);
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("if (a) { b = 1 } else if (c) b = 2; else { b = 3 }").unwrap();
        let Statement::If { else_branch, .. } = &program.statements[0] else {
            panic!("Expected if");
        };
        let else_branch = else_branch.as_ref().unwrap();
        assert!(matches!(
            else_branch[0],
            Statement::If {
                else_branch: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_string_escapes() {
        let Expression::String { value, .. } = expression(r#""say \"hi\"\n""#) else {
            panic!("Expected string");
        };
        assert_eq!(value, "say \"hi\"\n");
    }

    #[test]
    fn test_invalid_assignment_target() {
        let result = parse("a + b = 3");
        assert!(matches!(result, Err(ParseError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse("const a").is_err());
        assert!(parse("let a").is_ok());
    }

    #[test]
    fn test_error_positions() {
        let err = parse("addRule((obj) => { obj.props. })").unwrap_err();
        match err {
            ParseError::UnexpectedToken { span, expected, .. } => {
                assert_eq!(expected, "identifier");
                assert_eq!(span.start, 30);
            }
            other => panic!("Unexpected error: {:?}", other),
        }

        assert!(matches!(
            parse("if (a"),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_trailing_tokens_in_expression() {
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn test_bare_return_ends_at_line_break() {
        let program = parse("if (!ok) return\nconst x = 1").unwrap();
        assert_eq!(program.statements.len(), 2);
        match &program.statements[0] {
            Statement::If { then_branch, .. } => {
                assert!(matches!(then_branch[0], Statement::Return { value: None, .. }));
            }
            other => panic!("Expected if statement, got {:?}", other),
        }

        let program = parse("return 1 +\n 2").unwrap();
        assert!(matches!(program.statements[0], Statement::Return { value: Some(_), .. }));
    }
}
