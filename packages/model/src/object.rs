//! # Object Records
//!
//! Persisted shape of cards and fields. The JSON layout matches what the
//! document store distributes:
//!
//! ```text
//! { rootObjectId, objects: { [id]: { id, type, x, y, ...props,
//!   parentId?, copyOfId?, childIds?: {[id]: true}, rule? } } }
//! ```

use crate::Value;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Open, ordered property map of an object
pub type Properties = IndexMap<String, Value>;

/// Ordered set of child ids, persisted as `{ [id]: true }`
pub type ChildIds = IndexSet<ObjectId>;

/// Stable object identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Object discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Card,
    Field,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Card => "card",
            ObjectKind::Field => "field",
        }
    }

    /// Declared default for a property, consulted after explicit values and overrides
    pub fn default_property(&self, key: &str) -> Option<Value> {
        match (self, key) {
            (_, "x") | (_, "y") => Some(Value::Number(0.0)),
            (ObjectKind::Card, "width") | (ObjectKind::Card, "height") => {
                Some(Value::Number(100.0))
            }
            (ObjectKind::Field, "value") => Some(Value::String(String::new())),
            (ObjectKind::Field, "readOnly") => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card or a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub id: ObjectId,

    #[serde(rename = "type")]
    pub kind: ObjectKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,

    /// Direct origin of this object, if it was produced by copying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_of_id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "IndexSet::is_empty", with = "child_id_map")]
    pub child_ids: ChildIds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleRecord>,

    #[serde(flatten)]
    pub properties: Properties,
}

impl ObjectRecord {
    pub fn new(id: ObjectId, kind: ObjectKind, properties: Properties) -> Self {
        Self {
            id,
            kind,
            parent_id: None,
            copy_of_id: None,
            child_ids: ChildIds::new(),
            rule: None,
            properties,
        }
    }

    pub fn is_card(&self) -> bool {
        self.kind == ObjectKind::Card
    }

    pub fn is_field(&self) -> bool {
        self.kind == ObjectKind::Field
    }

    /// Explicit value, falling back to the declared default of the object kind
    pub fn property(&self, key: &str) -> Option<Value> {
        self.properties
            .get(key)
            .cloned()
            .or_else(|| self.kind.default_property(key))
    }

    pub fn number(&self, key: &str) -> f64 {
        self.property(key).and_then(|v| v.as_number()).unwrap_or(0.0)
    }
}

/// Rule attached to a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: String,

    /// Document version at authoring time; baseline for conflict detection
    pub created_at_version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub source: String,

    #[serde(default)]
    pub exceptions: Vec<RuleException>,
}

/// A rule computation that was not applied because the user set the value explicitly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleException {
    pub object_id: ObjectId,
    pub key: String,
    pub expected_value: Value,
    pub computed_value: Value,
}

/// Lifecycle state of a rule record. A field without a rule record is "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Pending,
    Source,
}

impl RuleRecord {
    pub fn pending(id: impl Into<String>, created_at_version: u64) -> Self {
        Self {
            id: id.into(),
            created_at_version,
            definition: None,
        }
    }

    pub fn state(&self) -> RuleState {
        match self.definition {
            Some(_) => RuleState::Source,
            None => RuleState::Pending,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.definition.as_ref().map(|d| d.source.as_str())
    }
}

/// Whole-document shape as persisted by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectsDocument {
    pub root_object_id: ObjectId,
    pub objects: IndexMap<ObjectId, ObjectRecord>,
}

mod child_id_map {
    use super::{ChildIds, ObjectId};
    use indexmap::IndexMap;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ids: &ChildIds, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ids.len()))?;
        for id in ids {
            map.serialize_entry(id, &true)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChildIds, D::Error> {
        let map = IndexMap::<ObjectId, bool>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .filter(|(_, present)| *present)
            .map(|(id, _)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let json = r#"{
            "id": "knob",
            "type": "card",
            "x": 162,
            "y": 10,
            "width": 44,
            "parentId": "slider",
            "copyOfId": "knob-proto",
            "childIds": { "label": true }
        }"#;

        let record: ObjectRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "knob");
        assert_eq!(record.kind, ObjectKind::Card);
        assert_eq!(record.parent_id, Some(ObjectId::from("slider")));
        assert_eq!(record.copy_of_id, Some(ObjectId::from("knob-proto")));
        assert!(record.child_ids.contains("label"));
        assert_eq!(record.properties.get("x"), Some(&Value::Number(162.0)));
        assert_eq!(record.properties.len(), 3);
        assert!(!record.properties.contains_key("parentId"));
    }

    #[test]
    fn test_rule_record_states() {
        let mut rule = RuleRecord::pending("rule-1", 4);
        assert_eq!(rule.state(), RuleState::Pending);
        assert_eq!(rule.source(), None);

        rule.definition = Some(RuleDefinition {
            source: "addRule((obj) => {})".to_string(),
            exceptions: vec![],
        });
        assert_eq!(rule.state(), RuleState::Source);

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["createdAtVersion"], 4);
        assert_eq!(json["definition"]["exceptions"], serde_json::json!([]));
    }

    #[test]
    fn test_defaults_by_kind() {
        assert_eq!(ObjectKind::Card.default_property("width"), Some(Value::Number(100.0)));
        assert_eq!(ObjectKind::Field.default_property("width"), None);
        assert_eq!(ObjectKind::Field.default_property("value"), Some(Value::from("")));
    }
}
