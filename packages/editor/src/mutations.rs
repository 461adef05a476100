//! # Editing Intents
//!
//! Semantic operations emitted by the rendering layer. Each intent is
//! validated against the store before anything is changed.
//!
//! ## Mutation Semantics
//!
//! ### MoveObject
//! - Reparents the object and sets its position relative to the new parent
//! - Fails if the new parent is not a card or is inside the moved object
//!
//! ### SetFieldValue
//! - Atomic replacement of the field's `value`
//! - A manual edit retires the field's rule
//!
//! ### DeleteObject
//! - Removes the object and all descendants

use cardboard_model::{ObjectId, ObjectKind, ObjectStore, Properties, StoreError, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Properties that are part of the record structure, not the open property map
const RESERVED_KEYS: &[&str] = &["id", "type", "parentId", "copyOfId", "childIds", "rule"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Mutation {
    /// Create a card or field, under the root card when no parent is given
    CreateObject {
        kind: ObjectKind,
        parent_id: Option<ObjectId>,
        properties: Properties,
    },

    /// Deep copy next to the original
    CopyObject { object_id: ObjectId },

    MoveObject {
        object_id: ObjectId,
        new_parent_id: ObjectId,
        x: f64,
        y: f64,
    },

    ResizeCard {
        object_id: ObjectId,
        width: f64,
        height: f64,
    },

    SetProperty {
        object_id: ObjectId,
        key: String,
        value: Value,
    },

    /// Manual edit of a field's text
    SetFieldValue { field_id: ObjectId, value: String },

    DeleteObject { object_id: ObjectId },

    /// Drop a field's rule without touching its value
    ClearRule { field_id: ObjectId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object is not a card: {0}")]
    NotACard(ObjectId),

    #[error("Object is not a field: {0}")]
    NotAField(ObjectId),

    #[error("Property '{0}' cannot be set directly")]
    ReservedProperty(String),

    #[error("Invalid size {width}x{height}")]
    InvalidSize { width: f64, height: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Mutation {
    /// Apply the intent. Returns the id of the object it created, if any.
    pub fn apply(&self, store: &mut ObjectStore) -> Result<Option<ObjectId>, MutationError> {
        self.validate(store)?;

        match self {
            Mutation::CreateObject {
                kind,
                parent_id,
                properties,
            } => Ok(Some(store.create(*kind, properties.clone(), parent_id.as_ref())?)),

            Mutation::CopyObject { object_id } => Ok(Some(store.copy(object_id)?)),

            Mutation::MoveObject {
                object_id,
                new_parent_id,
                x,
                y,
            } => {
                store.set_parent(object_id, new_parent_id)?;
                store.update(object_id, |props| {
                    props.insert("x".to_string(), Value::Number(*x));
                    props.insert("y".to_string(), Value::Number(*y));
                });
                Ok(None)
            }

            Mutation::ResizeCard {
                object_id,
                width,
                height,
            } => {
                store.update(object_id, |props| {
                    props.insert("width".to_string(), Value::Number(*width));
                    props.insert("height".to_string(), Value::Number(*height));
                });
                Ok(None)
            }

            Mutation::SetProperty {
                object_id,
                key,
                value,
            } => {
                Self::apply_set_property(store, object_id, key, value.clone());
                Ok(None)
            }

            Mutation::SetFieldValue { field_id, value } => {
                Self::apply_set_property(store, field_id, "value", Value::String(value.clone()));
                Ok(None)
            }

            Mutation::DeleteObject { object_id } => {
                store.destroy(object_id)?;
                Ok(None)
            }

            Mutation::ClearRule { field_id } => {
                store.update_record(field_id, |record| record.rule = None);
                Ok(None)
            }
        }
    }

    fn apply_set_property(store: &mut ObjectStore, id: &ObjectId, key: &str, value: Value) {
        store.update_record(id, |record| {
            if key == "value" && record.is_field() {
                record.rule = None;
            }
            record.properties.insert(key.to_string(), value);
        });
    }

    /// Validate without applying
    pub fn validate(&self, store: &ObjectStore) -> Result<(), MutationError> {
        match self {
            Mutation::CreateObject {
                parent_id,
                properties,
                ..
            } => {
                if let Some(parent_id) = parent_id {
                    Self::expect_card(store, parent_id)?;
                }
                match properties.keys().find(|key| RESERVED_KEYS.contains(&key.as_str())) {
                    Some(key) => Err(MutationError::ReservedProperty(key.clone())),
                    None => Ok(()),
                }
            }

            Mutation::CopyObject { object_id } | Mutation::DeleteObject { object_id } => {
                Self::expect_object(store, object_id)?;
                if object_id == store.root_id() {
                    return Err(StoreError::RootCard.into());
                }
                Ok(())
            }

            Mutation::MoveObject {
                object_id,
                new_parent_id,
                ..
            } => {
                Self::expect_object(store, object_id)?;
                Self::expect_card(store, new_parent_id)?;
                if object_id == store.root_id() {
                    return Err(StoreError::RootCard.into());
                }
                if store.is_descendant_of(new_parent_id, object_id) || new_parent_id == object_id {
                    return Err(StoreError::CycleDetected {
                        node: object_id.clone(),
                        parent: new_parent_id.clone(),
                    }
                    .into());
                }
                Ok(())
            }

            Mutation::ResizeCard {
                object_id,
                width,
                height,
            } => {
                Self::expect_card(store, object_id)?;
                if !(width.is_finite() && height.is_finite()) || *width < 0.0 || *height < 0.0 {
                    return Err(MutationError::InvalidSize {
                        width: *width,
                        height: *height,
                    });
                }
                Ok(())
            }

            Mutation::SetProperty { object_id, key, .. } => {
                Self::expect_object(store, object_id)?;
                if RESERVED_KEYS.contains(&key.as_str()) {
                    return Err(MutationError::ReservedProperty(key.clone()));
                }
                Ok(())
            }

            Mutation::SetFieldValue { field_id, .. } | Mutation::ClearRule { field_id } => {
                Self::expect_field(store, field_id)
            }
        }
    }

    fn expect_object(store: &ObjectStore, id: &ObjectId) -> Result<(), MutationError> {
        if store.contains(id) {
            Ok(())
        } else {
            Err(MutationError::ObjectNotFound(id.clone()))
        }
    }

    fn expect_card(store: &ObjectStore, id: &ObjectId) -> Result<(), MutationError> {
        let record = store
            .get(id)
            .map_err(|_| MutationError::ObjectNotFound(id.clone()))?;
        if record.is_card() {
            Ok(())
        } else {
            Err(MutationError::NotACard(id.clone()))
        }
    }

    fn expect_field(store: &ObjectStore, id: &ObjectId) -> Result<(), MutationError> {
        let record = store
            .get(id)
            .map_err(|_| MutationError::ObjectNotFound(id.clone()))?;
        if record.is_field() {
            Ok(())
        } else {
            Err(MutationError::NotAField(id.clone()))
        }
    }
}

/// Result of applying a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    /// New version number
    pub version: u64,

    /// Object created by the mutation
    pub created: Option<ObjectId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardboard_model::{IdGenerator, RuleRecord};

    fn store() -> ObjectStore {
        ObjectStore::with_id_generator(IdGenerator::sequential("m"))
    }

    #[test]
    fn test_mutation_serialization() {
        let mutation = Mutation::SetFieldValue {
            field_id: ObjectId::from("field-1"),
            value: "Hello World".to_string(),
        };

        let json = serde_json::to_string(&mutation).unwrap();
        assert!(json.contains("setFieldValue"));
        let deserialized: Mutation = serde_json::from_str(&json).unwrap();

        assert_eq!(mutation, deserialized);
    }

    #[test]
    fn test_manual_edit_clears_rule() {
        let mut store = store();
        let field = store
            .create(ObjectKind::Field, Properties::new(), None)
            .unwrap();
        store.update_record(&field, |record| record.rule = Some(RuleRecord::pending("r", 0)));

        Mutation::SetFieldValue {
            field_id: field.clone(),
            value: "42".to_string(),
        }
        .apply(&mut store)
        .unwrap();

        let record = store.get(&field).unwrap();
        assert!(record.rule.is_none());
        assert_eq!(record.properties.get("value"), Some(&Value::from("42")));
    }

    #[test]
    fn test_move_rejects_cycles() {
        let mut store = store();
        let outer = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        let inner = store
            .create(ObjectKind::Card, Properties::new(), Some(&outer))
            .unwrap();

        let mutation = Mutation::MoveObject {
            object_id: outer.clone(),
            new_parent_id: inner,
            x: 0.0,
            y: 0.0,
        };
        assert!(matches!(
            mutation.validate(&store),
            Err(MutationError::Store(StoreError::CycleDetected { .. }))
        ));
    }

    #[test]
    fn test_move_sets_relative_position() {
        let mut store = store();
        let a = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        let b = store.create(ObjectKind::Card, Properties::new(), None).unwrap();

        Mutation::MoveObject {
            object_id: b.clone(),
            new_parent_id: a.clone(),
            x: 12.0,
            y: 4.0,
        }
        .apply(&mut store)
        .unwrap();

        assert_eq!(store.get(&b).unwrap().parent_id.as_ref(), Some(&a));
        assert_eq!(store.get(&b).unwrap().number("x"), 12.0);
    }

    #[test]
    fn test_reserved_properties_are_rejected() {
        let mut store = store();
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();

        let mutation = Mutation::SetProperty {
            object_id: card,
            key: "parentId".to_string(),
            value: Value::from("elsewhere"),
        };
        assert_eq!(
            mutation.apply(&mut store),
            Err(MutationError::ReservedProperty("parentId".to_string()))
        );
    }

    #[test]
    fn test_root_cannot_be_deleted() {
        let mut store = store();
        let root = store.root_id().clone();

        let result = Mutation::DeleteObject { object_id: root }.apply(&mut store);
        assert_eq!(result, Err(MutationError::Store(StoreError::RootCard)));
    }
}
