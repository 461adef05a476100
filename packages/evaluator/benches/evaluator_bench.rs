use cardboard_evaluator::RuleEngine;
use cardboard_model::{
    IdGenerator, NoHistory, ObjectId, ObjectKind, ObjectStore, Properties, RuleDefinition,
    RuleRecord, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SLIDER_RULE: &str = r#"
addRule((obj) => {
  if (!obj.isCopyOf(getNode("slider"))) return
  const knob = obj.children().find(c => c.props.name === "knob")
  const value = obj.children().find(c => c.props.name === "value")
  if (!knob || !value) return
  const width = Number(obj.props.width)
  value.props.value = Math.round((knob.props.x + knob.props.width / 2) / width * 100)
})
"#;

fn slider_document(copies: usize) -> ObjectStore {
    let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("b"));

    let mut props = Properties::new();
    props.insert("width".to_string(), Value::from(449));
    let slider = store.create(ObjectKind::Card, props, None).unwrap();

    let mut knob = Properties::new();
    knob.insert("name".to_string(), Value::from("knob"));
    knob.insert("x".to_string(), Value::from(100));
    knob.insert("width".to_string(), Value::from(44));
    store.create(ObjectKind::Card, knob, Some(&slider)).unwrap();

    let mut value = Properties::new();
    value.insert("name".to_string(), Value::from("value"));
    store.create(ObjectKind::Field, value, Some(&slider)).unwrap();

    let mut rule = Properties::new();
    rule.insert("name".to_string(), Value::from("rule"));
    let rule_field = store.create(ObjectKind::Field, rule, Some(&slider)).unwrap();

    let source = SLIDER_RULE.replace("\"slider\"", &format!("\"{}\"", slider));
    store.update_record(&rule_field, |record| {
        record.rule = Some(RuleRecord {
            id: "slider-rule".to_string(),
            created_at_version: 0,
            definition: Some(RuleDefinition {
                source,
                exceptions: Vec::new(),
            }),
        });
    });

    let slider: ObjectId = slider;
    for _ in 0..copies {
        store.copy(&slider).unwrap();
    }

    store
}

fn evaluate_single_slider(c: &mut Criterion) {
    let store = slider_document(0);
    let engine = RuleEngine::default();

    c.bench_function("evaluate_single_slider", |b| {
        b.iter(|| engine.evaluate(black_box(&store), &NoHistory))
    });
}

fn evaluate_many_copies(c: &mut Criterion) {
    let store = slider_document(50);
    let engine = RuleEngine::default();

    c.bench_function("evaluate_fifty_slider_copies", |b| {
        b.iter(|| engine.evaluate(black_box(&store), &NoHistory))
    });
}

criterion_group!(benches, evaluate_single_slider, evaluate_many_copies);
criterion_main!(benches);
