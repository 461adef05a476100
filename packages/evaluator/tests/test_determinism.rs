/// Determinism tests - ensure evaluation is deterministic and reproducible
///
/// These tests validate that:
/// - Same document produces identical evaluations across runs
/// - Callback order follows document order, not hash order
/// - Rule errors and exceptions come out in the same order every time

use cardboard_evaluator::{Evaluation, RuleEngine};
use cardboard_model::{
    IdGenerator, NoHistory, ObjectKind, ObjectStore, Properties, RuleDefinition, RuleRecord, Value,
};

const TALLY_RULE: &str = r#"
let seen = 0

addRule((obj) => {
  seen = seen + 1
  if (obj.type === "field" && obj.props.name === "tally") {
    obj.props.value = seen
  }
})
"#;

fn document(copies: usize) -> ObjectStore {
    let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("d"));
    let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();

    let mut props = Properties::new();
    props.insert("name".to_string(), Value::from("tally"));
    store.create(ObjectKind::Field, props, Some(&card)).unwrap();

    for _ in 0..copies {
        store.copy(&card).unwrap();
    }

    let rule_field = store.create(ObjectKind::Field, Properties::new(), None).unwrap();
    store.update_record(&rule_field, |record| {
        record.rule = Some(RuleRecord {
            id: "tally".to_string(),
            created_at_version: 0,
            definition: Some(RuleDefinition {
                source: TALLY_RULE.to_string(),
                exceptions: Vec::new(),
            }),
        });
    });

    store
}

#[test]
fn test_evaluation_determinism() {
    let store = document(5);

    let results: Vec<Evaluation> = (0..10)
        .map(|_| RuleEngine::default().evaluate(&store, &NoHistory))
        .collect();

    for i in 1..results.len() {
        assert_eq!(
            results[0], results[i],
            "Evaluation {} differs from evaluation 0",
            i
        );
    }
}

#[test]
fn test_callbacks_follow_document_order() {
    let store = document(2);
    let evaluation = RuleEngine::default().evaluate(&store, &NoHistory);

    let tallies: Vec<Value> = store
        .iter()
        .filter(|record| record.properties.get("name") == Some(&Value::from("tally")))
        .filter_map(|record| evaluation.property(&store, &record.id, "value"))
        .collect();

    // root, card, tally => 3; each copy adds its card and its tally
    assert_eq!(tallies, vec![Value::from(3), Value::from(5), Value::from(7)]);
}

#[test]
fn test_fresh_stores_evaluate_identically() {
    let first = RuleEngine::default().evaluate(&document(3), &NoHistory);
    let second = RuleEngine::default().evaluate(&document(3), &NoHistory);

    assert_eq!(first, second);
}
