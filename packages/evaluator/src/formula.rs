//! Field formulas.
//!
//! A field with a non-empty `formula` property displays the result of that
//! expression instead of its `value`. Formulas are read-only: they see the
//! effective properties after rules, may refer to sibling fields by `name`,
//! and cannot call `addRule`, `getNode` or `override`.

use crate::engine::Evaluation;
use crate::error::{RuleError, RuleResult};
use crate::interpreter::Interpreter;
use cardboard_model::{ObjectId, ObjectStore, Value};
use cardboard_parser::ast::Span;

impl Evaluation {
    /// Displayed value of a field
    pub fn field_value(&self, store: &ObjectStore, field_id: &ObjectId) -> RuleResult<Value> {
        let mut interpreter =
            Interpreter::for_formulas(store, &self.layer, self.layer_owner.clone(), self.config);
        let value = interpreter.field_value(field_id)?;

        value.to_value().ok_or_else(|| {
            RuleError::type_error(
                Span::default(),
                format!("Formula of {} produced a {}", field_id, value.type_name()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleEngine;
    use cardboard_model::{IdGenerator, NoHistory, ObjectKind, Properties};

    fn field(store: &mut ObjectStore, card: &ObjectId, pairs: &[(&str, &str)]) -> ObjectId {
        let props: Properties = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect();
        store.create(ObjectKind::Field, props, Some(card)).unwrap()
    }

    fn fixture() -> (ObjectStore, ObjectId) {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("f"));
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        (store, card)
    }

    #[test]
    fn test_formula_reads_siblings_by_name() {
        let (mut store, card) = fixture();
        field(&mut store, &card, &[("name", "price"), ("value", "20")]);
        field(&mut store, &card, &[("name", "qty"), ("value", "3")]);
        let total = field(&mut store, &card, &[("name", "total"), ("formula", "price * qty")]);

        let evaluation = RuleEngine::default().evaluate(&store, &NoHistory);
        assert_eq!(evaluation.field_value(&store, &total), Ok(Value::from(60)));
    }

    #[test]
    fn test_formula_chains_through_other_formulas() {
        let (mut store, card) = fixture();
        field(&mut store, &card, &[("name", "a"), ("value", "2")]);
        field(&mut store, &card, &[("name", "b"), ("formula", "a + 1")]);
        let c = field(&mut store, &card, &[("name", "c"), ("formula", "`${b * 10}%`")]);

        let evaluation = Evaluation::empty(&store);
        assert_eq!(evaluation.field_value(&store, &c), Ok(Value::from("30%")));
    }

    #[test]
    fn test_formula_cycle_is_reported() {
        let (mut store, card) = fixture();
        let a = field(&mut store, &card, &[("name", "a"), ("formula", "b + 1")]);
        field(&mut store, &card, &[("name", "b"), ("formula", "a + 1")]);

        let evaluation = Evaluation::empty(&store);
        assert!(matches!(
            evaluation.field_value(&store, &a),
            Err(RuleError::FormulaCycle(_))
        ));
    }

    #[test]
    fn test_formula_cannot_register_rules() {
        let (mut store, card) = fixture();
        let f = field(&mut store, &card, &[("formula", "addRule(x => x)")]);

        let evaluation = Evaluation::empty(&store);
        assert!(matches!(
            evaluation.field_value(&store, &f),
            Err(RuleError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn test_plain_field_returns_value() {
        let (mut store, card) = fixture();
        let f = field(&mut store, &card, &[("value", "hello")]);

        let evaluation = Evaluation::empty(&store);
        assert_eq!(evaluation.field_value(&store, &f), Ok(Value::from("hello")));
    }
}
