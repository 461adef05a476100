//! Operator semantics shared by rule bodies and formulas

use crate::error::{RuleError, RuleResult};
use crate::value::RuntimeValue;
use cardboard_parser::ast::{BinaryOp, Span, UnaryOp};

pub fn is_truthy(value: &RuntimeValue) -> bool {
    match value {
        RuntimeValue::Null => false,
        RuntimeValue::Bool(b) => *b,
        RuntimeValue::Number(n) => *n != 0.0 && !n.is_nan(),
        RuntimeValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// `==`: numbers, numeric strings and booleans compare by numeric value
pub fn loose_equals(left: &RuntimeValue, right: &RuntimeValue) -> bool {
    match (left, right) {
        (RuntimeValue::Number(_), RuntimeValue::String(_))
        | (RuntimeValue::String(_), RuntimeValue::Number(_))
        | (RuntimeValue::Bool(_), _)
        | (_, RuntimeValue::Bool(_))
            if !matches!(left, RuntimeValue::Null) && !matches!(right, RuntimeValue::Null) =>
        {
            match (left.to_number(), right.to_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => left == right,
    }
}

/// Evaluate a binary operator over already evaluated operands.
/// `&&` and `||` short-circuit and are handled by the interpreter.
pub fn binary(
    operator: BinaryOp,
    left: &RuntimeValue,
    right: &RuntimeValue,
    span: Span,
) -> RuleResult<RuntimeValue> {
    match operator {
        BinaryOp::Add => match (left, right) {
            (RuntimeValue::String(_), _) | (_, RuntimeValue::String(_)) => {
                Ok(RuntimeValue::String(format!("{}{}", left, right)))
            }
            _ => arithmetic(operator, left, right, span, |a, b| Ok(a + b)),
        },
        BinaryOp::Subtract => arithmetic(operator, left, right, span, |a, b| Ok(a - b)),
        BinaryOp::Multiply => arithmetic(operator, left, right, span, |a, b| Ok(a * b)),
        BinaryOp::Divide => arithmetic(operator, left, right, span, |a, b| {
            if b != 0.0 {
                Ok(a / b)
            } else {
                Err(RuleError::DivisionByZero { span })
            }
        }),
        BinaryOp::Modulo => arithmetic(operator, left, right, span, |a, b| {
            if b != 0.0 {
                Ok(a % b)
            } else {
                Err(RuleError::DivisionByZero { span })
            }
        }),
        BinaryOp::Equals => Ok(RuntimeValue::Bool(loose_equals(left, right))),
        BinaryOp::NotEquals => Ok(RuntimeValue::Bool(!loose_equals(left, right))),
        BinaryOp::StrictEquals => Ok(RuntimeValue::Bool(left == right)),
        BinaryOp::StrictNotEquals => Ok(RuntimeValue::Bool(left != right)),
        BinaryOp::LessThan => compare(operator, left, right, span, |o| o.is_lt()),
        BinaryOp::LessThanOrEqual => compare(operator, left, right, span, |o| o.is_le()),
        BinaryOp::GreaterThan => compare(operator, left, right, span, |o| o.is_gt()),
        BinaryOp::GreaterThanOrEqual => compare(operator, left, right, span, |o| o.is_ge()),
        BinaryOp::And => Ok(if is_truthy(left) {
            right.clone()
        } else {
            left.clone()
        }),
        BinaryOp::Or => Ok(if is_truthy(left) {
            left.clone()
        } else {
            right.clone()
        }),
    }
}

pub fn unary(operator: UnaryOp, operand: &RuntimeValue, span: Span) -> RuleResult<RuntimeValue> {
    match operator {
        UnaryOp::Not => Ok(RuntimeValue::Bool(!is_truthy(operand))),
        UnaryOp::Negate | UnaryOp::Plus => {
            let n = operand.to_number().ok_or_else(|| RuleError::InvalidOperands {
                operator: if operator == UnaryOp::Negate { "-" } else { "+" }.to_string(),
                details: format!("Expected a number, got {}", operand.type_name()),
                span,
            })?;
            Ok(RuntimeValue::Number(if operator == UnaryOp::Negate { -n } else { n }))
        }
    }
}

fn arithmetic<F>(
    operator: BinaryOp,
    left: &RuntimeValue,
    right: &RuntimeValue,
    span: Span,
    apply: F,
) -> RuleResult<RuntimeValue>
where
    F: FnOnce(f64, f64) -> RuleResult<f64>,
{
    match (left.to_number(), right.to_number()) {
        (Some(a), Some(b)) => Ok(RuntimeValue::Number(apply(a, b)?)),
        _ => Err(RuleError::InvalidOperands {
            operator: operator.as_str().to_string(),
            details: format!(
                "Expected number {} number, got {} {} {}",
                operator.as_str(),
                describe(left),
                operator.as_str(),
                describe(right)
            ),
            span,
        }),
    }
}

fn compare<F>(
    operator: BinaryOp,
    left: &RuntimeValue,
    right: &RuntimeValue,
    span: Span,
    test: F,
) -> RuleResult<RuntimeValue>
where
    F: FnOnce(std::cmp::Ordering) -> bool,
{
    if let (RuntimeValue::String(a), RuntimeValue::String(b)) = (left, right) {
        return Ok(RuntimeValue::Bool(test(a.cmp(b))));
    }

    match (left.to_number(), right.to_number()) {
        (Some(a), Some(b)) => Ok(RuntimeValue::Bool(
            a.partial_cmp(&b).map(test).unwrap_or(false),
        )),
        _ => Err(RuleError::InvalidOperands {
            operator: operator.as_str().to_string(),
            details: format!(
                "Cannot compare {} with {}",
                describe(left),
                describe(right)
            ),
            span,
        }),
    }
}

fn describe(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::String(s) => format!("string {:?}", s),
        other => other.type_name().to_string(),
    }
}
