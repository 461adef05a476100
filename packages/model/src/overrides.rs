//! # Override Layer
//!
//! Per-owner override tables. An owner (usually a copied card) holds a table
//! mapping target objects to override records. A record's own properties
//! start empty and unset lookups fall through to its base: either an override
//! record inherited from the owner's copy ancestors, or the target itself.
//!
//! Tables live here, keyed by owner id, and are never attached to objects.
//! Writing for an owner only ever touches that owner's own table.

use crate::{ObjectId, ObjectStore, Properties, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Handle of an override record in the layer's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideId(usize);

impl OverrideId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// What a record falls through to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideBase {
    Object(ObjectId),
    Override(OverrideId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRecord {
    pub owner: ObjectId,
    pub target: ObjectId,
    pub base: OverrideBase,
    pub properties: Properties,
    /// Rule id that last wrote each key
    pub attribution: IndexMap<String, String>,
}

/// Result of resolving a target through an owner.
///
/// Equal handles denote the same resolved object, across any number of calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    Override(OverrideId),
    Object(ObjectId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideLayer {
    records: Vec<OverrideRecord>,
    tables: HashMap<ObjectId, IndexMap<ObjectId, OverrideId>>,
}

impl OverrideLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: OverrideId) -> Option<&OverrideRecord> {
        self.records.get(id.0)
    }

    /// Merge `partial` into the owner's override of `target`, creating it if needed
    pub fn override_properties(
        &mut self,
        store: &ObjectStore,
        owner: &ObjectId,
        target: &ObjectId,
        partial: Properties,
    ) -> OverrideId {
        let id = self.own_or_create(store, owner, target);
        let record = &mut self.records[id.0];
        for (key, value) in partial {
            record.attribution.shift_remove(&key);
            record.properties.insert(key, value);
        }
        id
    }

    /// Write a single key and remember which rule wrote it
    pub fn override_attributed(
        &mut self,
        store: &ObjectStore,
        owner: &ObjectId,
        target: &ObjectId,
        key: &str,
        value: Value,
        rule_id: &str,
    ) -> OverrideId {
        let id = self.own_or_create(store, owner, target);
        let record = &mut self.records[id.0];
        record.properties.insert(key.to_string(), value);
        record
            .attribution
            .insert(key.to_string(), rule_id.to_string());
        id
    }

    /// The owner's own entry, else one inherited through its copy chain, else the target
    pub fn resolve(&self, store: &ObjectStore, owner: &ObjectId, target: &ObjectId) -> Resolved {
        if let Some(id) = self.own_entry(owner, target) {
            return Resolved::Override(id);
        }

        match self.inherited_entry(store, owner, target) {
            Some(id) => Resolved::Override(id),
            None => Resolved::Object(target.clone()),
        }
    }

    /// Id of the object a resolved handle stands for
    pub fn target<'a>(&'a self, resolved: &'a Resolved) -> Option<&'a ObjectId> {
        match resolved {
            Resolved::Object(id) => Some(id),
            Resolved::Override(id) => self.get(*id).map(|r| &r.target),
        }
    }

    /// Look up a property through the override chain, then the store and defaults
    pub fn property(&self, store: &ObjectStore, resolved: &Resolved, key: &str) -> Option<Value> {
        let mut current = resolved.clone();
        // A base always has a smaller index than the record pointing at it
        loop {
            match current {
                Resolved::Object(id) => {
                    return store.get(&id).ok().and_then(|record| record.property(key));
                }
                Resolved::Override(id) => {
                    let record = self.get(id)?;
                    if let Some(value) = record.properties.get(key) {
                        return Some(value.clone());
                    }
                    current = match &record.base {
                        OverrideBase::Object(object) => Resolved::Object(object.clone()),
                        OverrideBase::Override(base) => Resolved::Override(*base),
                    };
                }
            }
        }
    }

    /// Rule that wrote `key` on the nearest record defining it
    pub fn attribution(&self, resolved: &Resolved, key: &str) -> Option<&str> {
        let mut current = match resolved {
            Resolved::Override(id) => *id,
            Resolved::Object(_) => return None,
        };

        loop {
            let record = self.get(current)?;
            if record.properties.contains_key(key) {
                return record.attribution.get(key).map(String::as_str);
            }
            current = match record.base {
                OverrideBase::Override(base) => base,
                OverrideBase::Object(_) => return None,
            };
        }
    }

    /// Children of a card, each resolved through the card's own layer
    pub fn resolved_children(&self, store: &ObjectStore, card: &ObjectId) -> Vec<Resolved> {
        match store.get(card) {
            Ok(record) => record
                .child_ids
                .iter()
                .filter(|child| store.contains(child))
                .map(|child| self.resolve(store, card, child))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Entries of the owner's own table, in insertion order
    pub fn entries(&self, owner: &ObjectId) -> impl Iterator<Item = (&ObjectId, OverrideId)> {
        self.tables
            .get(owner)
            .into_iter()
            .flat_map(|table| table.iter().map(|(target, id)| (target, *id)))
    }

    fn own_entry(&self, owner: &ObjectId, target: &ObjectId) -> Option<OverrideId> {
        self.tables.get(owner)?.get(target).copied()
    }

    fn inherited_entry(
        &self,
        store: &ObjectStore,
        owner: &ObjectId,
        target: &ObjectId,
    ) -> Option<OverrideId> {
        store
            .copy_chain(owner)
            .skip(1)
            .find_map(|ancestor| self.own_entry(&ancestor.id, target))
    }

    fn own_or_create(&mut self, store: &ObjectStore, owner: &ObjectId, target: &ObjectId) -> OverrideId {
        if let Some(id) = self.own_entry(owner, target) {
            return id;
        }

        let base = match self.inherited_entry(store, owner, target) {
            Some(inherited) => OverrideBase::Override(inherited),
            None => OverrideBase::Object(target.clone()),
        };

        let id = OverrideId(self.records.len());
        self.records.push(OverrideRecord {
            owner: owner.clone(),
            target: target.clone(),
            base,
            properties: Properties::new(),
            attribution: IndexMap::new(),
        });
        self.tables
            .entry(owner.clone())
            .or_default()
            .insert(target.clone(), id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdGenerator, ObjectKind};

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn fixture() -> (ObjectStore, ObjectId, ObjectId) {
        let mut store = ObjectStore::with_id_generator(IdGenerator::sequential("o"));
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        let field = store
            .create(ObjectKind::Field, props(&[("value", "a".into())]), Some(&card))
            .unwrap();
        (store, card, field)
    }

    #[test]
    fn test_override_then_resolve() {
        let (store, card, field) = fixture();
        let mut layer = OverrideLayer::new();

        layer.override_properties(&store, &card, &field, props(&[("value", "b".into())]));

        let resolved = layer.resolve(&store, &card, &field);
        assert_eq!(layer.property(&store, &resolved, "value"), Some(Value::from("b")));
        assert_eq!(layer.target(&resolved), Some(&field));

        // Other owners see the original
        let root = store.root_id().clone();
        let other = layer.resolve(&store, &root, &field);
        assert_eq!(other, Resolved::Object(field.clone()));
        assert_eq!(layer.property(&store, &other, "value"), Some(Value::from("a")));
    }

    #[test]
    fn test_resolve_is_stable() {
        let (store, card, field) = fixture();
        let mut layer = OverrideLayer::new();
        let first = layer.override_properties(&store, &card, &field, props(&[("x", 1.into())]));
        let second = layer.override_properties(&store, &card, &field, props(&[("y", 2.into())]));

        assert_eq!(first, second);
        assert_eq!(
            layer.resolve(&store, &card, &field),
            layer.resolve(&store, &card, &field)
        );
    }

    #[test]
    fn test_unset_keys_fall_through() {
        let (store, card, field) = fixture();
        let mut layer = OverrideLayer::new();
        layer.override_properties(&store, &card, &field, props(&[("x", 5.into())]));

        let resolved = layer.resolve(&store, &card, &field);
        assert_eq!(layer.property(&store, &resolved, "value"), Some(Value::from("a")));
        assert_eq!(layer.property(&store, &resolved, "readOnly"), Some(Value::Bool(false)));
        assert_eq!(layer.property(&store, &resolved, "missing"), None);
    }

    #[test]
    fn test_copied_owner_gets_own_table() {
        let (mut store, card, field) = fixture();
        let card_copy = store.copy(&card).unwrap();
        let mut layer = OverrideLayer::new();

        layer.override_properties(&store, &card, &field, props(&[("value", "first".into())]));

        // The copy inherits the ancestor's entry for reading
        let inherited = layer.resolve(&store, &card_copy, &field);
        assert_eq!(layer.property(&store, &inherited, "value"), Some(Value::from("first")));

        // Writing through the copy refines, never touching the ancestor's table
        layer.override_properties(&store, &card_copy, &field, props(&[("x", 9.into())]));
        let refined = layer.resolve(&store, &card_copy, &field);
        assert_ne!(refined, inherited);
        assert_eq!(layer.property(&store, &refined, "value"), Some(Value::from("first")));
        assert_eq!(layer.property(&store, &refined, "x"), Some(Value::from(9)));

        let original = layer.resolve(&store, &card, &field);
        assert_eq!(layer.property(&store, &original, "x"), Some(Value::from(0)));
        assert_eq!(layer.entries(&card).count(), 1);
        assert_eq!(layer.entries(&card_copy).count(), 1);
    }

    #[test]
    fn test_attribution_tracks_rule() {
        let (store, card, field) = fixture();
        let mut layer = OverrideLayer::new();
        layer.override_attributed(&store, &card, &field, "value", "z".into(), "rule-7");

        let resolved = layer.resolve(&store, &card, &field);
        assert_eq!(layer.attribution(&resolved, "value"), Some("rule-7"));

        layer.override_properties(&store, &card, &field, props(&[("value", "manual".into())]));
        assert_eq!(layer.attribution(&resolved, "value"), None);
    }

    #[test]
    fn test_resolved_children_use_card_layer() {
        let (store, card, field) = fixture();
        let mut layer = OverrideLayer::new();
        let id = layer.override_properties(&store, &card, &field, props(&[("x", 1.into())]));

        assert_eq!(layer.resolved_children(&store, &card), vec![Resolved::Override(id)]);
    }
}
