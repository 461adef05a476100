//! # Rule Engine
//!
//! Runs every field rule of a document against a fresh override layer.
//!
//! Rule sources run first, in document order. Each may register callbacks
//! through `addRule`; once all sources have run, every registered callback is
//! invoked once per object, objects in document order and callbacks in
//! registration order. Failures are recorded on the rule that raised them and
//! evaluation carries on with the next rule or callback.

use crate::config::EngineConfig;
use crate::error::RuleError;
use crate::interpreter::Interpreter;
use cardboard_model::{
    ObjectId, ObjectStore, OverrideLayer, Resolved, RuleException, SnapshotHistory, Value,
};
use tracing::{debug, info, instrument, warn};

/// What a single rule did during an evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub field_id: ObjectId,
    pub rule_id: String,
    pub created_at_version: u64,
    /// Callbacks registered through `addRule`
    pub callbacks: usize,
    /// Property writes that landed in the override layer
    pub writes: usize,
    pub exceptions: Vec<RuleException>,
    pub errors: Vec<RuleError>,
}

/// Result of running all rules over a document
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub(crate) layer: OverrideLayer,
    pub(crate) layer_owner: ObjectId,
    pub(crate) config: EngineConfig,
    outcomes: Vec<RuleOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate all rules. The store is only read; results live in the returned layer.
    #[instrument(skip(self, store, history), fields(objects = store.len()))]
    pub fn evaluate(&self, store: &ObjectStore, history: &dyn SnapshotHistory) -> Evaluation {
        info!("Starting rule evaluation");

        let sources: Vec<(ObjectId, String, u64, String)> = store
            .iter()
            .filter(|record| record.is_field())
            .filter_map(|record| {
                let rule = record.rule.as_ref()?;
                let source = rule.source()?;
                Some((
                    record.id.clone(),
                    rule.id.clone(),
                    rule.created_at_version,
                    source.to_string(),
                ))
            })
            .collect();

        let mut interpreter = Interpreter::for_rules(store, history, self.config);

        for (field_id, rule_id, version, source) in sources {
            debug!(field = %field_id, rule = %rule_id, version, "Running rule source");
            let index = interpreter.register_rule(field_id.clone(), rule_id.clone(), version);

            let result = cardboard_parser::parse(&source)
                .map_err(RuleError::from)
                .and_then(|program| interpreter.run_rule_body(index, &program));

            if let Err(err) = result {
                warn!(field = %field_id, rule = %rule_id, error = %err, "Rule source failed");
                interpreter.record_error(index, err);
            }
        }

        let object_ids: Vec<ObjectId> = store.iter().map(|record| record.id.clone()).collect();
        let callback_count = interpreter.callback_count();
        debug!(callbacks = callback_count, "Invoking rule callbacks");

        for object_id in &object_ids {
            for callback in 0..callback_count {
                if let Err(err) = interpreter.invoke_callback(callback, object_id) {
                    warn!(object = %object_id, error = %err, "Rule callback failed");
                    if let Some(rule) = interpreter.callback_rule(callback) {
                        interpreter.record_error(rule, err);
                    }
                }
            }
        }

        let (layer, outcomes) = interpreter.finish();
        let evaluation = Evaluation {
            layer,
            layer_owner: store.root_id().clone(),
            config: self.config,
            outcomes,
        };

        info!(
            rules = evaluation.outcomes.len(),
            exceptions = evaluation.exceptions().count(),
            errors = evaluation.errors().count(),
            "Rule evaluation complete"
        );

        evaluation
    }
}

impl Evaluation {
    /// Evaluation of a document without rules
    pub fn empty(store: &ObjectStore) -> Self {
        Self {
            layer: OverrideLayer::new(),
            layer_owner: store.root_id().clone(),
            config: EngineConfig::default(),
            outcomes: Vec::new(),
        }
    }

    pub fn layer(&self) -> &OverrideLayer {
        &self.layer
    }

    /// Owner of every override written by rules
    pub fn layer_owner(&self) -> &ObjectId {
        &self.layer_owner
    }

    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, field_id: &ObjectId) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|outcome| &outcome.field_id == field_id)
    }

    pub fn resolve(&self, store: &ObjectStore, id: &ObjectId) -> Resolved {
        self.layer.resolve(store, &self.layer_owner, id)
    }

    /// Effective property value after rules
    pub fn property(&self, store: &ObjectStore, id: &ObjectId, key: &str) -> Option<Value> {
        let resolved = self.resolve(store, id);
        self.layer.property(store, &resolved, key)
    }

    /// Rule that produced the effective value of `key`, if any
    pub fn attribution(&self, store: &ObjectStore, id: &ObjectId, key: &str) -> Option<&str> {
        let resolved = self.resolve(store, id);
        self.layer.attribution(&resolved, key)
    }

    pub fn exceptions(&self) -> impl Iterator<Item = &RuleException> {
        self.outcomes.iter().flat_map(|outcome| outcome.exceptions.iter())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&RuleOutcome, &RuleError)> {
        self.outcomes
            .iter()
            .flat_map(|outcome| outcome.errors.iter().map(move |err| (outcome, err)))
    }

    /// Store each rule's exceptions on its field's rule definition.
    /// Returns whether any definition changed.
    pub fn write_exceptions(&self, store: &mut ObjectStore) -> bool {
        let mut changed = false;

        for outcome in &self.outcomes {
            store.update_record(&outcome.field_id, |record| {
                let Some(definition) = record
                    .rule
                    .as_mut()
                    .filter(|rule| rule.id == outcome.rule_id)
                    .and_then(|rule| rule.definition.as_mut())
                else {
                    return;
                };

                if definition.exceptions != outcome.exceptions {
                    definition.exceptions = outcome.exceptions.clone();
                    changed = true;
                }
            });
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardboard_model::{
        IdGenerator, NoHistory, ObjectKind, Properties, RuleDefinition, RuleRecord,
    };
    use std::collections::BTreeMap;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn with_rule(store: &mut ObjectStore, field: &ObjectId, source: &str, version: u64) {
        store.update_record(field, |record| {
            record.rule = Some(RuleRecord {
                id: format!("rule-{}", record.id),
                created_at_version: version,
                definition: Some(RuleDefinition {
                    source: source.to_string(),
                    exceptions: Vec::new(),
                }),
            });
        });
    }

    #[test]
    fn test_callbacks_visit_every_object() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("e"));
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        let field = store
            .create(ObjectKind::Field, props(&[("name", "tag".into())]), Some(&card))
            .unwrap();
        with_rule(
            &mut store,
            &field,
            "addRule(obj => { if (obj.type === \"card\") { obj.props.tag = `seen ${obj.id}` } })",
            0,
        );

        let evaluation = RuleEngine::default().evaluate(&store, &NoHistory);

        assert_eq!(
            evaluation.property(&store, &card, "tag"),
            Some(Value::from(format!("seen {}", card)))
        );
        let root = store.root_id().clone();
        assert_eq!(
            evaluation.property(&store, &root, "tag"),
            Some(Value::from(format!("seen {}", root)))
        );
        assert_eq!(evaluation.attribution(&store, &card, "tag"), Some(format!("rule-{}", field).as_str()));
        assert!(store.explicit_property(&card, "tag").is_none());
    }

    #[test]
    fn test_failing_rule_does_not_stop_others() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("e"));
        let broken = store.create(ObjectKind::Field, Properties::new(), None).unwrap();
        let working = store.create(ObjectKind::Field, Properties::new(), None).unwrap();
        with_rule(&mut store, &broken, "const x = (", 0);
        with_rule(
            &mut store,
            &working,
            &format!("getNode(\"{}\").props.value = 1 + 1", working),
            0,
        );

        let evaluation = RuleEngine::default().evaluate(&store, &NoHistory);

        assert!(matches!(
            evaluation.outcome(&broken).unwrap().errors[0],
            RuleError::Parse(_)
        ));
        assert_eq!(evaluation.property(&store, &working, "value"), Some(Value::from(2)));
    }

    #[test]
    fn test_conflicting_edit_becomes_exception() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("e"));
        let field = store
            .create(ObjectKind::Field, props(&[("value", "10".into())]), None)
            .unwrap();
        let target = store
            .create(ObjectKind::Field, props(&[("value", "1".into())]), None)
            .unwrap();
        with_rule(
            &mut store,
            &field,
            &format!("getNode(\"{}\").props.value = 5", target),
            1,
        );

        let mut history = BTreeMap::new();
        history.insert(1, store.clone());

        // Manual edit after the rule was authored
        store.update(&target, |p| {
            p.insert("value".to_string(), "3".into());
        });

        let evaluation = RuleEngine::default().evaluate(&store, &history);
        let exceptions: Vec<_> = evaluation.exceptions().collect();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].expected_value, Value::from("3"));
        assert_eq!(exceptions[0].computed_value, Value::from(5));
        assert_eq!(evaluation.property(&store, &target, "value"), Some(Value::from("3")));

        assert!(evaluation.write_exceptions(&mut store));
        assert!(!evaluation.write_exceptions(&mut store));
    }

    #[test]
    fn test_unchanged_value_is_overwritten() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("e"));
        let field = store.create(ObjectKind::Field, Properties::new(), None).unwrap();
        let target = store
            .create(ObjectKind::Field, props(&[("value", "1".into())]), None)
            .unwrap();
        with_rule(
            &mut store,
            &field,
            &format!("getNode(\"{}\").props.value = 5", target),
            1,
        );

        let mut history = BTreeMap::new();
        history.insert(1, store.clone());

        let evaluation = RuleEngine::default().evaluate(&store, &history);
        assert_eq!(evaluation.exceptions().count(), 0);
        assert_eq!(evaluation.property(&store, &target, "value"), Some(Value::from(5)));
    }

    #[test]
    fn test_pending_rules_are_skipped() {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("e"));
        let field = store.create(ObjectKind::Field, Properties::new(), None).unwrap();
        store.update_record(&field, |record| record.rule = Some(RuleRecord::pending("p", 0)));

        let evaluation = RuleEngine::default().evaluate(&store, &NoHistory);
        assert!(evaluation.outcomes().is_empty());
        assert!(evaluation.layer().is_empty());
    }
}
