//! Values flowing through the rule interpreter

use crate::interpreter::Env;
use cardboard_model::{format_number, ObjectId, Value};
use cardboard_parser::ast::ArrowBody;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Handle to a card or field
    Object(ObjectId),
    /// The `props` view of an object; reads resolve through the override layer
    Props(ObjectId),
    Array(Rc<Vec<RuntimeValue>>),
    /// Immutable plain record, e.g. the result of `globalPos()`
    Record(Rc<IndexMap<String, RuntimeValue>>),
    Function(Rc<Closure>),
    Builtin(Builtin),
    /// `Math`
    Math,
}

/// Arrow function with its captured scope
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<ArrowBody>,
    pub env: Env,
}

// The captured scope may hold the closure itself
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    AddRule,
    GetNode,
    Override,
    ToString,
    ToNumber,
    ParseFloat,
    Round,
    Floor,
    Ceil,
    Abs,
    Min,
    Max,
    Sqrt,
    Pow,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::AddRule => "addRule",
            Builtin::GetNode => "getNode",
            Builtin::Override => "override",
            Builtin::ToString => "String",
            Builtin::ToNumber => "Number",
            Builtin::ParseFloat => "parseFloat",
            Builtin::Round => "Math.round",
            Builtin::Floor => "Math.floor",
            Builtin::Ceil => "Math.ceil",
            Builtin::Abs => "Math.abs",
            Builtin::Min => "Math.min",
            Builtin::Max => "Math.max",
            Builtin::Sqrt => "Math.sqrt",
            Builtin::Pow => "Math.pow",
        }
    }

    /// Whether the builtin touches the document or the rule registry
    pub fn is_effectful(&self) -> bool {
        matches!(self, Builtin::AddRule | Builtin::GetNode | Builtin::Override)
    }

    pub fn global(name: &str) -> Option<Builtin> {
        match name {
            "addRule" => Some(Builtin::AddRule),
            "getNode" => Some(Builtin::GetNode),
            "override" => Some(Builtin::Override),
            "String" => Some(Builtin::ToString),
            "Number" => Some(Builtin::ToNumber),
            "parseFloat" => Some(Builtin::ParseFloat),
            _ => None,
        }
    }

    pub fn math(name: &str) -> Option<Builtin> {
        match name {
            "round" => Some(Builtin::Round),
            "floor" => Some(Builtin::Floor),
            "ceil" => Some(Builtin::Ceil),
            "abs" => Some(Builtin::Abs),
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "sqrt" => Some(Builtin::Sqrt),
            "pow" => Some(Builtin::Pow),
            _ => None,
        }
    }
}

impl RuntimeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Null => "null",
            RuntimeValue::Bool(_) => "boolean",
            RuntimeValue::Number(_) => "number",
            RuntimeValue::String(_) => "string",
            RuntimeValue::Object(_) => "object",
            RuntimeValue::Props(_) => "props",
            RuntimeValue::Array(_) => "array",
            RuntimeValue::Record(_) => "record",
            RuntimeValue::Function(_) | RuntimeValue::Builtin(_) => "function",
            RuntimeValue::Math => "Math",
        }
    }

    /// Numeric view following the usual script coercions. `None` means NaN.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            RuntimeValue::Null => Some(0.0),
            RuntimeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RuntimeValue::Number(n) => Some(*n),
            RuntimeValue::String(s) if s.trim().is_empty() => Some(0.0),
            RuntimeValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Convert into a storable property value
    pub fn to_value(&self) -> Option<Value> {
        match self {
            RuntimeValue::Null => Some(Value::Null),
            RuntimeValue::Bool(b) => Some(Value::Bool(*b)),
            RuntimeValue::Number(n) => Some(Value::Number(*n)),
            RuntimeValue::String(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }
}

impl From<Value> for RuntimeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RuntimeValue::Null,
            Value::Bool(b) => RuntimeValue::Bool(b),
            Value::Number(n) => RuntimeValue::Number(n),
            Value::String(s) => RuntimeValue::String(s),
        }
    }
}

impl PartialEq for RuntimeValue {
    /// Strict equality: scalars by value, everything else by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Null, RuntimeValue::Null) => true,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Object(a), RuntimeValue::Object(b)) => a == b,
            (RuntimeValue::Props(a), RuntimeValue::Props(b)) => a == b,
            (RuntimeValue::Array(a), RuntimeValue::Array(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Record(a), RuntimeValue::Record(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Builtin(a), RuntimeValue::Builtin(b)) => a == b,
            (RuntimeValue::Math, RuntimeValue::Math) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Null => write!(f, "null"),
            RuntimeValue::Bool(b) => write!(f, "{}", b),
            RuntimeValue::Number(n) if n.is_nan() => write!(f, "NaN"),
            RuntimeValue::Number(n) => write!(f, "{}", format_number(*n)),
            RuntimeValue::String(s) => write!(f, "{}", s),
            RuntimeValue::Object(id) => write!(f, "[object {}]", id),
            RuntimeValue::Props(id) => write!(f, "[props {}]", id),
            RuntimeValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            RuntimeValue::Record(_) => write!(f, "[object Object]"),
            RuntimeValue::Function(_) => write!(f, "[function]"),
            RuntimeValue::Builtin(builtin) => write!(f, "[function {}]", builtin.name()),
            RuntimeValue::Math => write!(f, "[object Math]"),
        }
    }
}
