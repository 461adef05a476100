//! Tree-walking interpreter for rule sources and field formulas.
//!
//! Reads go through the override layer so a rule sees the writes of rules
//! that ran before it. The store itself is never mutated; every write lands
//! in the layer under the evaluation's layer owner.

use crate::config::EngineConfig;
use crate::engine::RuleOutcome;
use crate::error::{RuleError, RuleResult};
use crate::ops;
use crate::value::{Builtin, Closure, RuntimeValue};
use cardboard_model::{
    NoHistory, ObjectId, ObjectStore, OverrideLayer, RuleException, SnapshotHistory, Value,
};
use cardboard_parser::ast::{ArrowBody, BinaryOp, Expression, Program, Span, Statement, TemplatePart};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

static NO_HISTORY: NoHistory = NoHistory;

const MIN_SCOPE_PRUNE: usize = 256;

pub type Env = Rc<RefCell<Scope>>;

/// Lexical scope
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Binding>,
    parent: Option<Env>,
}

#[derive(Debug)]
struct Binding {
    value: RuntimeValue,
    mutable: bool,
}

enum AssignOutcome {
    Assigned,
    Constant,
    Missing,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }
}

fn lookup(env: &Env, name: &str) -> Option<RuntimeValue> {
    let scope = env.borrow();
    match scope.bindings.get(name) {
        Some(binding) => Some(binding.value.clone()),
        None => scope.parent.as_ref().and_then(|parent| lookup(parent, name)),
    }
}

fn declare(env: &Env, name: &str, value: RuntimeValue, mutable: bool) {
    env.borrow_mut()
        .bindings
        .insert(name.to_string(), Binding { value, mutable });
}

fn assign(env: &Env, name: &str, value: RuntimeValue) -> AssignOutcome {
    let mut scope = env.borrow_mut();
    match scope.bindings.get_mut(name) {
        Some(binding) if !binding.mutable => AssignOutcome::Constant,
        Some(binding) => {
            binding.value = value;
            AssignOutcome::Assigned
        }
        None => match scope.parent.clone() {
            Some(parent) => {
                drop(scope);
                assign(&parent, name, value)
            }
            None => AssignOutcome::Missing,
        },
    }
}

enum Flow {
    Normal,
    Return(RuntimeValue),
}

/// A callback registered through `addRule`
pub(crate) struct Callback {
    pub rule: usize,
    pub function: Rc<Closure>,
}

pub(crate) struct Interpreter<'a> {
    store: &'a ObjectStore,
    history: &'a dyn SnapshotHistory,
    config: EngineConfig,
    layer: Cow<'a, OverrideLayer>,
    owner: ObjectId,
    rules: Vec<RuleOutcome>,
    callbacks: Vec<Callback>,
    current_rule: Option<usize>,
    formula_stack: Vec<ObjectId>,
    /// Every scope created so far; closures stored in a scope keep it alive
    scopes: Vec<Weak<RefCell<Scope>>>,
    prune_scopes_at: usize,
    depth: usize,
    steps: usize,
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        self.release_scopes();
    }
}

impl<'a> Interpreter<'a> {
    /// Interpreter for a full rule evaluation, writing into a fresh layer owned by the root
    pub fn for_rules(
        store: &'a ObjectStore,
        history: &'a dyn SnapshotHistory,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            history,
            config,
            layer: Cow::Owned(OverrideLayer::new()),
            owner: store.root_id().clone(),
            rules: Vec::new(),
            callbacks: Vec::new(),
            current_rule: None,
            formula_stack: Vec::new(),
            scopes: Vec::new(),
            prune_scopes_at: MIN_SCOPE_PRUNE,
            depth: 0,
            steps: 0,
        }
    }

    /// Read-only interpreter over the result of a rule evaluation
    pub fn for_formulas(
        store: &'a ObjectStore,
        layer: &'a OverrideLayer,
        owner: ObjectId,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            history: &NO_HISTORY,
            config,
            layer: Cow::Borrowed(layer),
            owner,
            rules: Vec::new(),
            callbacks: Vec::new(),
            current_rule: None,
            formula_stack: Vec::new(),
            scopes: Vec::new(),
            prune_scopes_at: MIN_SCOPE_PRUNE,
            depth: 0,
            steps: 0,
        }
    }

    pub fn register_rule(&mut self, field_id: ObjectId, rule_id: String, created_at_version: u64) -> usize {
        self.rules.push(RuleOutcome {
            field_id,
            rule_id,
            created_at_version,
            callbacks: 0,
            writes: 0,
            exceptions: Vec::new(),
            errors: Vec::new(),
        });
        self.rules.len() - 1
    }

    pub fn record_error(&mut self, rule: usize, error: RuleError) {
        if let Some(outcome) = self.rules.get_mut(rule) {
            outcome.errors.push(error);
        }
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn callback_rule(&self, callback: usize) -> Option<usize> {
        self.callbacks.get(callback).map(|c| c.rule)
    }

    pub fn finish(mut self) -> (OverrideLayer, Vec<RuleOutcome>) {
        let layer = std::mem::replace(&mut self.layer, Cow::Owned(OverrideLayer::new()));
        (layer.into_owned(), std::mem::take(&mut self.rules))
    }

    fn root_scope(&mut self) -> Env {
        self.track_scope(Scope::root())
    }

    fn child_scope(&mut self, parent: &Env) -> Env {
        self.track_scope(Scope::child(parent))
    }

    fn track_scope(&mut self, env: Env) -> Env {
        if self.scopes.len() >= self.prune_scopes_at {
            self.scopes.retain(|scope| scope.strong_count() > 0);
            self.prune_scopes_at = (self.scopes.len() * 2).max(MIN_SCOPE_PRUNE);
        }
        self.scopes.push(Rc::downgrade(&env));
        env
    }

    /// Break closure/scope cycles so every scope of this run is freed
    fn release_scopes(&mut self) {
        self.callbacks.clear();
        for scope in self.scopes.drain(..) {
            let Some(scope) = scope.upgrade() else {
                continue;
            };
            let (bindings, parent) = {
                let mut scope = scope.borrow_mut();
                (std::mem::take(&mut scope.bindings), scope.parent.take())
            };
            drop(bindings);
            drop(parent);
        }
    }

    /// Execute a rule's top-level statements
    pub fn run_rule_body(&mut self, rule: usize, program: &Program) -> RuleResult<()> {
        self.begin(Some(rule));
        let env = self.root_scope();
        self.exec_block(&program.statements, &env)?;
        Ok(())
    }

    /// Call a registered callback with one object
    pub fn invoke_callback(&mut self, callback: usize, object_id: &ObjectId) -> RuleResult<()> {
        let Some(entry) = self.callbacks.get(callback) else {
            return Ok(());
        };
        let (rule, function) = (entry.rule, entry.function.clone());

        self.begin(Some(rule));
        self.call_closure(
            function,
            vec![RuntimeValue::Object(object_id.clone())],
            Span::default(),
        )?;
        Ok(())
    }

    fn begin(&mut self, rule: Option<usize>) {
        self.current_rule = rule;
        self.depth = 0;
        self.steps = 0;
    }

    fn tick(&mut self) -> RuleResult<()> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(RuleError::StepLimitExceeded {
                limit: self.config.max_steps,
            });
        }
        Ok(())
    }

    // Statements

    fn exec_block(&mut self, statements: &[Statement], env: &Env) -> RuleResult<Flow> {
        for statement in statements {
            if let Flow::Return(value) = self.exec_statement(statement, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_statement(&mut self, statement: &Statement, env: &Env) -> RuleResult<Flow> {
        self.tick()?;

        match statement {
            Statement::Let {
                name,
                value,
                mutable,
                ..
            } => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => RuntimeValue::Null,
                };
                declare(env, name, value, *mutable);
                Ok(Flow::Normal)
            }
            Statement::Assign {
                target,
                value,
                span,
            } => {
                let value = self.eval_expression(value, env)?;
                self.assign_to(target, value, env, *span)?;
                Ok(Flow::Normal)
            }
            Statement::Expression { expression, .. } => {
                self.eval_expression(expression, env)?;
                Ok(Flow::Normal)
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let condition = self.eval_expression(condition, env)?;
                if ops::is_truthy(&condition) {
                    let scope = self.child_scope(env);
                    self.exec_block(then_branch, &scope)
                } else if let Some(else_branch) = else_branch {
                    let scope = self.child_scope(env);
                    self.exec_block(else_branch, &scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expression(expr, env)?,
                    None => RuntimeValue::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::Block { statements, .. } => {
                let scope = self.child_scope(env);
                self.exec_block(statements, &scope)
            }
        }
    }

    fn assign_to(&mut self, target: &Expression, value: RuntimeValue, env: &Env, span: Span) -> RuleResult<()> {
        match target {
            Expression::Identifier { name, span } => match assign(env, name, value) {
                AssignOutcome::Assigned => Ok(()),
                AssignOutcome::Constant => Err(RuleError::type_error(
                    *span,
                    format!("Assignment to constant variable '{}'", name),
                )),
                AssignOutcome::Missing => Err(RuleError::UnknownIdentifier {
                    name: name.clone(),
                    span: *span,
                }),
            },
            Expression::Member {
                object, property, ..
            } => {
                let object = self.eval_expression(object, env)?;
                self.assign_property(object, property, value, span)
            }
            Expression::Index { object, index, .. } => {
                let object = self.eval_expression(object, env)?;
                let key = self.eval_expression(index, env)?.to_string();
                self.assign_property(object, &key, value, span)
            }
            _ => Err(RuleError::type_error(span, "Invalid assignment target")),
        }
    }

    fn assign_property(&mut self, object: RuntimeValue, key: &str, value: RuntimeValue, span: Span) -> RuleResult<()> {
        match object {
            RuntimeValue::Props(id) => self.apply_override(&id, key, value, span),
            RuntimeValue::Null => Err(RuleError::type_error(
                span,
                format!("Cannot set properties of null (setting '{}')", key),
            )),
            RuntimeValue::Object(_) => Err(RuleError::type_error(
                span,
                format!("Cannot assign '{}' on an object, assign to its props instead", key),
            )),
            other => Err(RuleError::type_error(
                span,
                format!("Cannot set property '{}' on {}", key, other.type_name()),
            )),
        }
    }

    // Expressions

    pub fn eval_expression(&mut self, expr: &Expression, env: &Env) -> RuleResult<RuntimeValue> {
        self.tick()?;

        match expr {
            Expression::Number { value, .. } => Ok(RuntimeValue::Number(*value)),
            Expression::String { value, .. } => Ok(RuntimeValue::String(value.clone())),
            Expression::Boolean { value, .. } => Ok(RuntimeValue::Bool(*value)),
            Expression::Null { .. } => Ok(RuntimeValue::Null),

            Expression::Template { parts, .. } => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => result.push_str(text),
                        TemplatePart::Expression(expr) => {
                            let value = self.eval_expression(expr, env)?;
                            result.push_str(&value.to_string());
                        }
                    }
                }
                Ok(RuntimeValue::String(result))
            }

            Expression::Array { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval_expression(element, env)?);
                }
                Ok(RuntimeValue::Array(Rc::new(items)))
            }

            Expression::Identifier { name, span } => self.resolve_identifier(name, env, *span),

            Expression::Member {
                object,
                property,
                span,
            } => {
                let object = self.eval_expression(object, env)?;
                self.member(&object, property, *span)
            }

            Expression::Index {
                object,
                index,
                span,
            } => {
                let object = self.eval_expression(object, env)?;
                let index = self.eval_expression(index, env)?;
                match (&object, &index) {
                    (RuntimeValue::Array(items), RuntimeValue::Number(n)) => Ok(array_get(items, *n)),
                    _ => self.member(&object, &index.to_string(), *span),
                }
            }

            Expression::Call {
                callee,
                arguments,
                span,
            } => {
                if let Expression::Member {
                    object, property, ..
                } = callee.as_ref()
                {
                    let receiver = self.eval_expression(object, env)?;
                    let args = self.eval_arguments(arguments, env)?;
                    return self.call_method(receiver, property, args, *span);
                }

                let function = self.eval_expression(callee, env)?;
                let args = self.eval_arguments(arguments, env)?;
                self.call_value(function, args, *span)
            }

            Expression::Unary {
                operator,
                operand,
                span,
            } => {
                let operand = self.eval_expression(operand, env)?;
                ops::unary(*operator, &operand, *span)
            }

            Expression::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left = self.eval_expression(left, env)?;

                // Short circuit
                match operator {
                    BinaryOp::And if !ops::is_truthy(&left) => return Ok(left),
                    BinaryOp::Or if ops::is_truthy(&left) => return Ok(left),
                    BinaryOp::And | BinaryOp::Or => return self.eval_expression(right, env),
                    _ => {}
                }

                let right = self.eval_expression(right, env)?;
                ops::binary(*operator, &left, &right, *span)
            }

            Expression::Conditional {
                condition,
                consequent,
                alternate,
                ..
            } => {
                let condition = self.eval_expression(condition, env)?;
                if ops::is_truthy(&condition) {
                    self.eval_expression(consequent, env)
                } else {
                    self.eval_expression(alternate, env)
                }
            }

            Expression::Arrow { params, body, .. } => Ok(RuntimeValue::Function(Rc::new(Closure {
                params: params.clone(),
                body: Rc::new(body.clone()),
                env: env.clone(),
            }))),
        }
    }

    fn eval_arguments(&mut self, arguments: &[Expression], env: &Env) -> RuleResult<Vec<RuntimeValue>> {
        arguments
            .iter()
            .map(|argument| self.eval_expression(argument, env))
            .collect()
    }

    fn resolve_identifier(&mut self, name: &str, env: &Env, span: Span) -> RuleResult<RuntimeValue> {
        if let Some(value) = lookup(env, name) {
            return Ok(value);
        }

        if name == "Math" {
            return Ok(RuntimeValue::Math);
        }

        if let Some(builtin) = Builtin::global(name) {
            if !builtin.is_effectful() || self.formula_stack.is_empty() {
                return Ok(RuntimeValue::Builtin(builtin));
            }
        }

        if let Some(value) = self.formula_sibling(name)? {
            return Ok(value);
        }

        Err(RuleError::UnknownIdentifier {
            name: name.to_string(),
            span,
        })
    }

    fn member(&mut self, object: &RuntimeValue, property: &str, span: Span) -> RuleResult<RuntimeValue> {
        match object {
            RuntimeValue::Object(id) => {
                let record = self
                    .store
                    .get(id)
                    .map_err(|_| RuleError::UnknownObject(id.clone()))?;
                Ok(match property {
                    "id" => RuntimeValue::String(id.to_string()),
                    "type" => RuntimeValue::String(record.kind.to_string()),
                    "props" => RuntimeValue::Props(id.clone()),
                    "parent" => self.parent_of(id),
                    _ => RuntimeValue::Null,
                })
            }
            RuntimeValue::Props(id) => Ok(self.read_property(id, property)),
            RuntimeValue::Record(fields) => Ok(fields.get(property).cloned().unwrap_or(RuntimeValue::Null)),
            RuntimeValue::Array(items) if property == "length" => Ok(RuntimeValue::Number(items.len() as f64)),
            RuntimeValue::String(s) if property == "length" => {
                Ok(RuntimeValue::Number(s.chars().count() as f64))
            }
            RuntimeValue::Math => Ok(match property {
                "PI" => RuntimeValue::Number(std::f64::consts::PI),
                _ => Builtin::math(property)
                    .map(RuntimeValue::Builtin)
                    .unwrap_or(RuntimeValue::Null),
            }),
            RuntimeValue::Null => Err(RuleError::type_error(
                span,
                format!("Cannot read properties of null (reading '{}')", property),
            )),
            _ => Ok(RuntimeValue::Null),
        }
    }

    /// Resolved property value as seen by rules
    fn read_property(&self, id: &ObjectId, key: &str) -> RuntimeValue {
        let resolved = self.layer.resolve(self.store, &self.owner, id);
        self.layer
            .property(self.store, &resolved, key)
            .map(RuntimeValue::from)
            .unwrap_or(RuntimeValue::Null)
    }

    fn parent_of(&self, id: &ObjectId) -> RuntimeValue {
        match self.store.get(id).ok().and_then(|record| record.parent_id.clone()) {
            Some(parent_id) => RuntimeValue::Object(parent_id),
            None => RuntimeValue::Null,
        }
    }

    // Calls

    fn call_method(
        &mut self,
        receiver: RuntimeValue,
        method: &str,
        args: Vec<RuntimeValue>,
        span: Span,
    ) -> RuleResult<RuntimeValue> {
        match (&receiver, method) {
            (RuntimeValue::Object(id), "parent") => Ok(self.parent_of(id)),
            (RuntimeValue::Object(id), "children") => {
                let children = self
                    .store
                    .children(id)
                    .map_err(|_| RuleError::UnknownObject(id.clone()))?
                    .into_iter()
                    .map(|child| RuntimeValue::Object(child.id.clone()))
                    .collect();
                Ok(RuntimeValue::Array(Rc::new(children)))
            }
            (RuntimeValue::Object(id), "isCopyOf") => Ok(RuntimeValue::Bool(match args.first() {
                Some(RuntimeValue::Object(original)) => self.store.is_copy_of(id, original),
                _ => false,
            })),
            (RuntimeValue::Object(id), "globalPos") => self.global_position(id),
            (RuntimeValue::Array(items), _) => self.call_array_method(items.clone(), method, args, span),
            (RuntimeValue::Number(n), "toFixed") => {
                let digits = args.first().and_then(|d| d.to_number()).unwrap_or(0.0).clamp(0.0, 20.0) as usize;
                Ok(RuntimeValue::String(format!("{:.*}", digits, n)))
            }
            (RuntimeValue::Null, _) => Err(RuleError::type_error(
                span,
                format!("Cannot read properties of null (reading '{}')", method),
            )),
            (_, "toString") => Ok(RuntimeValue::String(receiver.to_string())),
            _ => {
                let function = self.member(&receiver, method, span)?;
                self.call_value(function, args, span)
            }
        }
    }

    fn call_array_method(
        &mut self,
        items: Rc<Vec<RuntimeValue>>,
        method: &str,
        args: Vec<RuntimeValue>,
        span: Span,
    ) -> RuleResult<RuntimeValue> {
        let argument = args.into_iter().next().unwrap_or(RuntimeValue::Null);

        match method {
            "includes" => Ok(RuntimeValue::Bool(items.contains(&argument))),
            "indexOf" => Ok(RuntimeValue::Number(
                items
                    .iter()
                    .position(|item| *item == argument)
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            )),
            "find" | "filter" | "some" | "every" | "map" | "forEach" => {
                let mut mapped = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let result = self.call_value(
                        argument.clone(),
                        vec![item.clone(), RuntimeValue::Number(index as f64)],
                        span,
                    )?;
                    let hit = ops::is_truthy(&result);
                    match method {
                        "find" if hit => return Ok(item.clone()),
                        "some" if hit => return Ok(RuntimeValue::Bool(true)),
                        "every" if !hit => return Ok(RuntimeValue::Bool(false)),
                        "filter" if hit => mapped.push(item.clone()),
                        "map" => mapped.push(result),
                        _ => {}
                    }
                }
                Ok(match method {
                    "find" | "forEach" => RuntimeValue::Null,
                    "some" => RuntimeValue::Bool(false),
                    "every" => RuntimeValue::Bool(true),
                    _ => RuntimeValue::Array(Rc::new(mapped)),
                })
            }
            _ => Err(RuleError::NotCallable { span }),
        }
    }

    fn call_value(&mut self, function: RuntimeValue, args: Vec<RuntimeValue>, span: Span) -> RuleResult<RuntimeValue> {
        match function {
            RuntimeValue::Function(closure) => self.call_closure(closure, args, span),
            RuntimeValue::Builtin(builtin) => self.call_builtin(builtin, args, span),
            _ => Err(RuleError::NotCallable { span }),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, args: Vec<RuntimeValue>, _span: Span) -> RuleResult<RuntimeValue> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuleError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        let env = self.child_scope(&closure.env);
        let mut args = args.into_iter();
        for param in &closure.params {
            declare(&env, param, args.next().unwrap_or(RuntimeValue::Null), true);
        }

        self.depth += 1;
        let result = match closure.body.as_ref() {
            ArrowBody::Expression(expr) => self.eval_expression(expr, &env),
            ArrowBody::Block(statements) => self.exec_block(statements, &env).map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Normal => RuntimeValue::Null,
            }),
        };
        self.depth -= 1;

        result
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<RuntimeValue>, span: Span) -> RuleResult<RuntimeValue> {
        match builtin {
            Builtin::AddRule => {
                let rule = self
                    .current_rule
                    .ok_or_else(|| RuleError::type_error(span, "addRule is only available in rule sources"))?;
                match args.into_iter().next() {
                    Some(RuntimeValue::Function(function)) => {
                        self.callbacks.push(Callback { rule, function });
                        self.rules[rule].callbacks += 1;
                        Ok(RuntimeValue::Null)
                    }
                    _ => Err(RuleError::type_error(span, "addRule expects a function")),
                }
            }
            Builtin::GetNode => match args.first() {
                Some(RuntimeValue::String(id)) => {
                    let id = ObjectId::from(id.as_str());
                    Ok(if self.store.contains(&id) {
                        RuntimeValue::Object(id)
                    } else {
                        RuntimeValue::Null
                    })
                }
                Some(RuntimeValue::Object(id)) => Ok(RuntimeValue::Object(id.clone())),
                _ => Err(RuleError::type_error(span, "getNode expects an id string")),
            },
            Builtin::Override => {
                let mut args = args.into_iter();
                let target = match args.next() {
                    Some(RuntimeValue::Object(id)) | Some(RuntimeValue::Props(id)) => id,
                    _ => return Err(RuleError::type_error(span, "override expects an object")),
                };
                let key = match args.next() {
                    Some(RuntimeValue::String(key)) => key,
                    _ => return Err(RuleError::type_error(span, "override expects a property name")),
                };
                let value = args.next().unwrap_or(RuntimeValue::Null);
                self.apply_override(&target, &key, value, span)?;
                Ok(RuntimeValue::Null)
            }
            Builtin::ToString => Ok(RuntimeValue::String(
                args.first().map(|v| v.to_string()).unwrap_or_default(),
            )),
            Builtin::ToNumber => Ok(RuntimeValue::Number(
                args.first().map(number_or_nan).unwrap_or(0.0),
            )),
            Builtin::ParseFloat => Ok(RuntimeValue::Number(
                args.first().map(|v| parse_float(&v.to_string())).unwrap_or(f64::NAN),
            )),
            Builtin::Round => Ok(RuntimeValue::Number((number_arg(&args, 0) + 0.5).floor())),
            Builtin::Floor => Ok(RuntimeValue::Number(number_arg(&args, 0).floor())),
            Builtin::Ceil => Ok(RuntimeValue::Number(number_arg(&args, 0).ceil())),
            Builtin::Abs => Ok(RuntimeValue::Number(number_arg(&args, 0).abs())),
            Builtin::Sqrt => Ok(RuntimeValue::Number(number_arg(&args, 0).sqrt())),
            Builtin::Pow => Ok(RuntimeValue::Number(
                number_arg(&args, 0).powf(number_arg(&args, 1)),
            )),
            Builtin::Min => Ok(RuntimeValue::Number(
                args.iter()
                    .map(number_or_nan)
                    .fold(f64::INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) }),
            )),
            Builtin::Max => Ok(RuntimeValue::Number(
                args.iter()
                    .map(number_or_nan)
                    .fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) }),
            )),
        }
    }

    fn global_position(&self, id: &ObjectId) -> RuleResult<RuntimeValue> {
        let (mut x, mut y) = (0.0, 0.0);
        let mut current = Some(id.clone());
        let mut remaining = self.store.len();

        while let Some(object_id) = current {
            if remaining == 0 {
                break;
            }
            remaining -= 1;

            let record = self
                .store
                .get(&object_id)
                .map_err(|_| RuleError::UnknownObject(object_id.clone()))?;
            x += self.read_property(&object_id, "x").to_number().unwrap_or(0.0);
            y += self.read_property(&object_id, "y").to_number().unwrap_or(0.0);
            current = record.parent_id.clone();
        }

        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), RuntimeValue::Number(x));
        fields.insert("y".to_string(), RuntimeValue::Number(y));
        Ok(RuntimeValue::Record(Rc::new(fields)))
    }

    // Writes

    /// Write a computed value unless it would clobber a manual edit made since the rule was authored
    fn apply_override(&mut self, target: &ObjectId, key: &str, value: RuntimeValue, span: Span) -> RuleResult<()> {
        let rule = self
            .current_rule
            .ok_or_else(|| RuleError::type_error(span, "Only rules can write properties"))?;
        if !self.store.contains(target) {
            return Err(RuleError::UnknownObject(target.clone()));
        }

        let computed = value.to_value().ok_or_else(|| {
            RuleError::type_error(
                span,
                format!("Cannot store a {} in property '{}'", value.type_name(), key),
            )
        })?;
        let current = self
            .store
            .explicit_property(target, key)
            .cloned()
            .unwrap_or(Value::Null);

        if self.is_conflict(target, key, &current, &computed, self.rules[rule].created_at_version) {
            debug!(object = %target, key, expected = %current, computed = %computed, "Skipping conflicting override");
            let exception = RuleException {
                object_id: target.clone(),
                key: key.to_string(),
                expected_value: current,
                computed_value: computed,
            };
            let exceptions = &mut self.rules[rule].exceptions;
            if !exceptions.contains(&exception) {
                exceptions.push(exception);
            }
            return Ok(());
        }

        let rule_id = self.rules[rule].rule_id.clone();
        self.layer
            .to_mut()
            .override_attributed(self.store, &self.owner, target, key, computed, &rule_id);
        self.rules[rule].writes += 1;
        Ok(())
    }

    /// A write conflicts when the user set a value that differs both from the
    /// computed one and from the baseline captured when the rule was authored.
    /// Objects created later take the baseline of the object they were copied from.
    fn is_conflict(&self, target: &ObjectId, key: &str, current: &Value, computed: &Value, version: u64) -> bool {
        if current.is_empty() || values_match(current, computed) {
            return false;
        }

        let Some(snapshot) = self.history.snapshot_at(version) else {
            return false;
        };

        let baseline = self
            .store
            .copy_chain(target)
            .find(|record| snapshot.contains(&record.id))
            .map(|record| {
                snapshot
                    .explicit_property(&record.id, key)
                    .cloned()
                    .unwrap_or(Value::Null)
            });

        match baseline {
            Some(baseline) => !values_match(current, &baseline),
            None => true,
        }
    }

    // Formulas

    /// Value of a field: its formula result if it has one, else its resolved `value`
    pub fn field_value(&mut self, field_id: &ObjectId) -> RuleResult<RuntimeValue> {
        let record = self
            .store
            .get(field_id)
            .map_err(|_| RuleError::UnknownObject(field_id.clone()))?;

        let formula = match self.read_property(field_id, "formula") {
            RuntimeValue::String(source) if !source.trim().is_empty() => source,
            _ => return Ok(self.read_property(field_id, "value")),
        };

        if self.formula_stack.contains(field_id) {
            return Err(RuleError::FormulaCycle(field_id.clone()));
        }

        let expression = cardboard_parser::parse_expression(&formula)?;
        let env = self.root_scope();
        declare(&env, "props", RuntimeValue::Props(field_id.clone()), false);
        declare(
            &env,
            "parent",
            match &record.parent_id {
                Some(parent_id) => RuntimeValue::Object(parent_id.clone()),
                None => RuntimeValue::Null,
            },
            false,
        );

        self.formula_stack.push(field_id.clone());
        let result = self.eval_expression(&expression, &env);
        self.formula_stack.pop();
        result
    }

    /// Sibling field named `name` of the formula being evaluated, numeric when possible
    fn formula_sibling(&mut self, name: &str) -> RuleResult<Option<RuntimeValue>> {
        let Some(current) = self.formula_stack.last() else {
            return Ok(None);
        };
        let Some(parent_id) = self
            .store
            .get(current)
            .ok()
            .and_then(|record| record.parent_id.clone())
        else {
            return Ok(None);
        };

        let sibling = self
            .store
            .children(&parent_id)
            .unwrap_or_default()
            .into_iter()
            .find(|child| {
                child.is_field()
                    && matches!(child.properties.get("name"), Some(Value::String(n)) if n == name)
            })
            .map(|child| child.id.clone());

        match sibling {
            Some(sibling) => {
                let value = self.field_value(&sibling)?;
                Ok(Some(numeric_view(value)))
            }
            None => Ok(None),
        }
    }
}

fn values_match(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((a.as_number(), b.as_number()), (Some(x), Some(y)) if x == y)
        }
        _ => false,
    }
}

fn numeric_view(value: RuntimeValue) -> RuntimeValue {
    match &value {
        RuntimeValue::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => RuntimeValue::Number(n),
            Err(_) => value,
        },
        _ => value,
    }
}

fn array_get(items: &[RuntimeValue], index: f64) -> RuntimeValue {
    if index < 0.0 || index.fract() != 0.0 {
        return RuntimeValue::Null;
    }
    items.get(index as usize).cloned().unwrap_or(RuntimeValue::Null)
}

fn number_or_nan(value: &RuntimeValue) -> f64 {
    value.to_number().unwrap_or(f64::NAN)
}

fn number_arg(args: &[RuntimeValue], index: usize) -> f64 {
    args.get(index).map(number_or_nan).unwrap_or(f64::NAN)
}

/// Longest numeric prefix of `text`
fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    (1..=text.len())
        .rev()
        .filter(|end| text.is_char_boundary(*end))
        .find_map(|end| text[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}
