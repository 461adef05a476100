//! # Object Store
//!
//! Arena of object records keyed by id. Parent/child and copy-of relations
//! are id-based and resolved through lookups, never through back-pointers.
//!
//! ## Invariants
//!
//! - Exactly one object has no `parent_id`: the root card
//! - `child.parent_id == Some(parent)` iff `parent.child_ids` contains `child`
//! - Copy-of chains are finite; a copy points at its immediate source
//! - Iteration order is insertion order and is stable

use crate::copy_tracker::{self, CopyChain};
use crate::{
    IdGenerator, ObjectId, ObjectKind, ObjectRecord, ObjectsDocument, Properties, StoreError,
    StoreResult, Value,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root_id: ObjectId,
    objects: IndexMap<ObjectId, ObjectRecord>,
    ids: IdGenerator,
}

impl ObjectStore {
    /// Create a store holding only an empty root card
    pub fn new() -> Self {
        Self::with_id_generator(IdGenerator::default())
    }

    pub fn with_id_generator(mut ids: IdGenerator) -> Self {
        let root_id = ids.new_id();
        let mut properties = Properties::new();
        properties.insert("x".to_string(), Value::Number(0.0));
        properties.insert("y".to_string(), Value::Number(0.0));
        properties.insert("width".to_string(), Value::from("100%"));
        properties.insert("height".to_string(), Value::from("100%"));

        let mut objects = IndexMap::new();
        objects.insert(
            root_id.clone(),
            ObjectRecord::new(root_id.clone(), ObjectKind::Card, properties),
        );

        Self {
            root_id,
            objects,
            ids,
        }
    }

    /// Load a persisted document, validating structural integrity
    pub fn from_document(doc: ObjectsDocument) -> StoreResult<Self> {
        Self::from_document_with(doc, IdGenerator::default())
    }

    pub fn from_document_with(doc: ObjectsDocument, ids: IdGenerator) -> StoreResult<Self> {
        let store = Self {
            root_id: doc.root_object_id,
            objects: doc.objects,
            ids,
        };
        store.validate()?;
        Ok(store)
    }

    pub fn to_document(&self) -> ObjectsDocument {
        ObjectsDocument {
            root_object_id: self.root_id.clone(),
            objects: self.objects.clone(),
        }
    }

    pub fn root_id(&self) -> &ObjectId {
        &self.root_id
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// All records in stable insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values()
    }

    pub fn get(&self, id: &ObjectId) -> StoreResult<&ObjectRecord> {
        self.objects
            .get(id)
            .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))
    }

    /// Explicit value of a property, without defaults
    pub fn explicit_property(&self, id: &ObjectId, key: &str) -> Option<&Value> {
        self.objects.get(id).and_then(|r| r.properties.get(key))
    }

    /// Explicit value, falling back to the declared default
    pub fn property(&self, id: &ObjectId, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.get(id)?.property(key))
    }

    /// Allocate an id that no live object uses
    pub fn new_id(&mut self) -> ObjectId {
        loop {
            let id = self.ids.new_id();
            if !self.objects.contains_key(&id) {
                return id;
            }
        }
    }

    /// Create an object under `parent_id` (the root card when `None`)
    pub fn create(
        &mut self,
        kind: ObjectKind,
        properties: Properties,
        parent_id: Option<&ObjectId>,
    ) -> StoreResult<ObjectId> {
        let parent_id = parent_id.cloned().unwrap_or_else(|| self.root_id.clone());
        self.ensure_card(&parent_id)?;

        let id = self.new_id();
        let mut record = ObjectRecord::new(id.clone(), kind, properties);
        record.parent_id = Some(parent_id.clone());
        self.objects.insert(id.clone(), record);

        if let Some(parent) = self.objects.get_mut(&parent_id) {
            parent.child_ids.insert(id.clone());
        }

        debug!(id = %id, kind = %kind, parent = %parent_id, "Created object");
        Ok(id)
    }

    /// Mutate an object's properties.
    ///
    /// Missing ids are tolerated: deletions may race with queued edits.
    /// Returns whether the mutator ran.
    pub fn update<F>(&mut self, id: &ObjectId, mutator: F) -> bool
    where
        F: FnOnce(&mut Properties),
    {
        match self.objects.get_mut(id) {
            Some(record) => {
                mutator(&mut record.properties);
                true
            }
            None => false,
        }
    }

    /// Like [`update`](Self::update) but with access to the whole record.
    /// Structural links must be changed through the store API instead.
    pub fn update_record<F>(&mut self, id: &ObjectId, mutator: F) -> bool
    where
        F: FnOnce(&mut ObjectRecord),
    {
        let Some(record) = self.objects.get_mut(id) else {
            return false;
        };

        let (parent_id, copy_of_id, child_ids) = (
            record.parent_id.clone(),
            record.copy_of_id.clone(),
            record.child_ids.clone(),
        );
        mutator(record);
        record.id = id.clone();
        record.parent_id = parent_id;
        record.copy_of_id = copy_of_id;
        record.child_ids = child_ids;
        true
    }

    /// Destroy an object and its descendants (post-order). Destroying a missing id is a no-op.
    pub fn destroy(&mut self, id: &ObjectId) -> StoreResult<()> {
        let Some(record) = self.objects.get(id) else {
            return Ok(());
        };
        let Some(parent_id) = record.parent_id.clone() else {
            return Err(StoreError::RootCard);
        };

        let children: Vec<ObjectId> = record.child_ids.iter().cloned().collect();
        for child in &children {
            self.destroy_subtree(child);
        }

        if let Some(parent) = self.objects.get_mut(&parent_id) {
            parent.child_ids.shift_remove(id);
        }
        self.objects.shift_remove(id);

        debug!(id = %id, "Destroyed object");
        Ok(())
    }

    fn destroy_subtree(&mut self, id: &ObjectId) {
        let children: Vec<ObjectId> = match self.objects.get(id) {
            Some(record) => record.child_ids.iter().cloned().collect(),
            None => return,
        };
        for child in &children {
            self.destroy_subtree(child);
        }
        self.objects.shift_remove(id);
    }

    /// Deep-copy the subtree rooted at `id` next to the original.
    ///
    /// Every new node's `copy_of_id` is its own direct source. Rules stay on the originals.
    pub fn copy(&mut self, id: &ObjectId) -> StoreResult<ObjectId> {
        let parent_id = self
            .get(id)?
            .parent_id
            .clone()
            .ok_or(StoreError::RootCard)?;

        let copy_id = self.copy_subtree(id, &parent_id)?;
        if let Some(parent) = self.objects.get_mut(&parent_id) {
            parent.child_ids.insert(copy_id.clone());
        }

        debug!(source = %id, copy = %copy_id, "Copied object");
        Ok(copy_id)
    }

    fn copy_subtree(&mut self, source_id: &ObjectId, parent_id: &ObjectId) -> StoreResult<ObjectId> {
        let source = self.get(source_id)?.clone();
        let copy_id = self.new_id();

        let mut record = ObjectRecord::new(copy_id.clone(), source.kind, source.properties);
        record.parent_id = Some(parent_id.clone());
        record.copy_of_id = Some(source.id.clone());
        self.objects.insert(copy_id.clone(), record);

        for child_id in &source.child_ids {
            let child_copy = self.copy_subtree(child_id, &copy_id)?;
            if let Some(record) = self.objects.get_mut(&copy_id) {
                record.child_ids.insert(child_copy);
            }
        }

        Ok(copy_id)
    }

    /// Re-parent an object, appending it to the new parent's children
    pub fn set_parent(&mut self, id: &ObjectId, new_parent_id: &ObjectId) -> StoreResult<()> {
        let old_parent_id = self
            .get(id)?
            .parent_id
            .clone()
            .ok_or(StoreError::RootCard)?;
        self.ensure_card(new_parent_id)?;

        if new_parent_id == id || self.is_descendant_of(new_parent_id, id) {
            return Err(StoreError::CycleDetected {
                node: id.clone(),
                parent: new_parent_id.clone(),
            });
        }

        if &old_parent_id == new_parent_id {
            return Ok(());
        }

        if let Some(old_parent) = self.objects.get_mut(&old_parent_id) {
            old_parent.child_ids.shift_remove(id);
        }
        if let Some(new_parent) = self.objects.get_mut(new_parent_id) {
            new_parent.child_ids.insert(id.clone());
        }
        if let Some(record) = self.objects.get_mut(id) {
            record.parent_id = Some(new_parent_id.clone());
        }

        Ok(())
    }

    pub fn parent(&self, id: &ObjectId) -> StoreResult<Option<&ObjectRecord>> {
        match &self.get(id)?.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// Children in stored order; dangling ids are skipped
    pub fn children(&self, id: &ObjectId) -> StoreResult<Vec<&ObjectRecord>> {
        Ok(self
            .get(id)?
            .child_ids
            .iter()
            .filter_map(|child| self.objects.get(child))
            .collect())
    }

    /// Whether `id` sits somewhere below `ancestor` in the card tree
    pub fn is_descendant_of(&self, id: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut current = self.objects.get(id).and_then(|r| r.parent_id.as_ref());
        let mut remaining = self.objects.len();

        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            current = self.objects.get(parent_id).and_then(|r| r.parent_id.as_ref());
        }

        false
    }

    /// Position relative to the root card
    pub fn global_position(&self, id: &ObjectId) -> StoreResult<(f64, f64)> {
        let record = self.get(id)?;
        let (x, y) = (record.number("x"), record.number("y"));

        match &record.parent_id {
            Some(parent_id) => {
                let (px, py) = self.global_position(parent_id)?;
                Ok((x + px, y + py))
            }
            None => Ok((x, y)),
        }
    }

    pub fn is_copy_of(&self, candidate: &ObjectId, original: &ObjectId) -> bool {
        copy_tracker::is_copy_of(self, candidate, original)
    }

    pub fn copy_chain<'a>(&'a self, id: &'a ObjectId) -> CopyChain<'a> {
        copy_tracker::copy_chain(self, id)
    }

    fn ensure_card(&self, id: &ObjectId) -> StoreResult<()> {
        if self.get(id)?.is_card() {
            Ok(())
        } else {
            Err(StoreError::NotACard(id.clone()))
        }
    }

    fn validate(&self) -> StoreResult<()> {
        let root = self.objects.get(&self.root_id).ok_or_else(|| {
            StoreError::invalid_document(format!("root object {} is missing", self.root_id))
        })?;
        if !root.is_card() || root.parent_id.is_some() {
            return Err(StoreError::invalid_document(
                "root object must be a card without a parent",
            ));
        }

        for (key, record) in &self.objects {
            if key != &record.id {
                return Err(StoreError::invalid_document(format!(
                    "object stored under {} has id {}",
                    key, record.id
                )));
            }

            if record.is_field() && !record.child_ids.is_empty() {
                return Err(StoreError::invalid_document(format!(
                    "field {} has children",
                    record.id
                )));
            }

            match &record.parent_id {
                None if key != &self.root_id => {
                    return Err(StoreError::invalid_document(format!(
                        "object {} has no parent but is not the root",
                        record.id
                    )));
                }
                Some(parent_id) => {
                    let parent = self.objects.get(parent_id).ok_or_else(|| {
                        StoreError::invalid_document(format!(
                            "parent {} of {} is missing",
                            parent_id, record.id
                        ))
                    })?;
                    if !parent.is_card() || !parent.child_ids.contains(&record.id) {
                        return Err(StoreError::invalid_document(format!(
                            "{} does not list {} as a child",
                            parent_id, record.id
                        )));
                    }
                }
                None => {}
            }

            for child_id in &record.child_ids {
                let linked = self
                    .objects
                    .get(child_id)
                    .map(|child| child.parent_id.as_ref() == Some(&record.id))
                    .unwrap_or(false);
                if !linked {
                    return Err(StoreError::invalid_document(format!(
                        "child {} of {} does not point back to its parent",
                        child_id, record.id
                    )));
                }
            }

            if self.copy_chain_has_cycle(&record.id) {
                return Err(StoreError::invalid_document(format!(
                    "copy chain of {} is cyclic",
                    record.id
                )));
            }
        }

        // Parent cycles detached from the root would pass the link checks above
        let mut reachable = HashSet::new();
        let mut stack = vec![&self.root_id];
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                if let Some(record) = self.objects.get(id) {
                    stack.extend(record.child_ids.iter());
                }
            }
        }
        if reachable.len() != self.objects.len() {
            return Err(StoreError::invalid_document(
                "some objects are not reachable from the root",
            ));
        }

        Ok(())
    }

    fn copy_chain_has_cycle(&self, id: &ObjectId) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id);

        while let Some(id) = current {
            if !seen.insert(id) {
                return true;
            }
            current = self.objects.get(id).and_then(|r| r.copy_of_id.as_ref());
        }

        false
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn store() -> ObjectStore {
        ObjectStore::with_id_generator(IdGenerator::sequential("t"))
    }

    #[test]
    fn test_new_store_has_root_card() {
        let store = store();
        let root = store.get(store.root_id()).unwrap();

        assert!(root.is_card());
        assert!(root.parent_id.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_attaches_to_parent() {
        let mut store = store();
        let card = store
            .create(ObjectKind::Card, props(&[("x", 10.into())]), None)
            .unwrap();
        let field = store
            .create(ObjectKind::Field, Properties::new(), Some(&card))
            .unwrap();

        assert!(store.get(store.root_id()).unwrap().child_ids.contains(&card));
        assert!(store.get(&card).unwrap().child_ids.contains(&field));
        assert_eq!(store.get(&field).unwrap().parent_id, Some(card));
    }

    #[test]
    fn test_create_under_field_fails() {
        let mut store = store();
        let field = store.create(ObjectKind::Field, Properties::new(), None).unwrap();

        let result = store.create(ObjectKind::Field, Properties::new(), Some(&field));
        assert_eq!(result, Err(StoreError::NotACard(field)));
    }

    #[test]
    fn test_get_missing_object() {
        let store = store();
        let missing = ObjectId::from("nope");
        assert_eq!(store.get(&missing), Err(StoreError::ObjectNotFound(missing.clone())));
    }

    #[test]
    fn test_update_missing_is_noop() {
        let mut store = store();
        let ran = store.update(&ObjectId::from("gone"), |props| {
            props.insert("x".to_string(), 1.into());
        });
        assert!(!ran);
    }

    #[test]
    fn test_update_record_keeps_structure() {
        let mut store = store();
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();

        store.update_record(&card, |record| {
            record.parent_id = None;
            record.properties.insert("color".to_string(), "red".into());
        });

        let record = store.get(&card).unwrap();
        assert_eq!(record.parent_id.as_ref(), Some(store.root_id()));
        assert_eq!(record.properties.get("color"), Some(&Value::from("red")));
    }

    #[test]
    fn test_property_falls_back_to_default() {
        let mut store = store();
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();

        assert_eq!(store.property(&card, "width").unwrap(), Some(Value::Number(100.0)));
        assert_eq!(store.property(&card, "color").unwrap(), None);
        assert!(store.explicit_property(&card, "width").is_none());
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut store = store();
        let outer = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        let inner = store.create(ObjectKind::Card, Properties::new(), Some(&outer)).unwrap();

        let result = store.set_parent(&outer, &inner);
        assert!(matches!(result, Err(StoreError::CycleDetected { .. })));

        let other = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        store.set_parent(&inner, &other).unwrap();
        assert!(!store.get(&outer).unwrap().child_ids.contains(&inner));
        assert!(store.get(&other).unwrap().child_ids.contains(&inner));
    }

    #[test]
    fn test_global_position_sums_parents() {
        let mut store = store();
        let outer = store
            .create(ObjectKind::Card, props(&[("x", 100.into()), ("y", 50.into())]), None)
            .unwrap();
        let inner = store
            .create(ObjectKind::Field, props(&[("x", 5.into()), ("y", 7.into())]), Some(&outer))
            .unwrap();

        assert_eq!(store.global_position(&inner).unwrap(), (105.0, 57.0));
    }

    #[test]
    fn test_destroy_root_is_rejected() {
        let mut store = store();
        let root = store.root_id().clone();
        assert_eq!(store.destroy(&root), Err(StoreError::RootCard));
        assert_eq!(store.copy(&root), Err(StoreError::RootCard));
    }

    #[test]
    fn test_document_round_trip_validates() {
        let mut store = store();
        let card = store.create(ObjectKind::Card, Properties::new(), None).unwrap();
        store.create(ObjectKind::Field, Properties::new(), Some(&card)).unwrap();

        let json = serde_json::to_string(&store.to_document()).unwrap();
        let doc: ObjectsDocument = serde_json::from_str(&json).unwrap();
        let loaded = ObjectStore::from_document(doc).unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.root_id(), store.root_id());
    }

    #[test]
    fn test_document_with_broken_back_link_is_rejected() {
        let json = r#"{
            "rootObjectId": "root",
            "objects": {
                "root": { "id": "root", "type": "card", "x": 0, "y": 0, "childIds": { "a": true } },
                "a": { "id": "a", "type": "card", "x": 0, "y": 0 }
            }
        }"#;

        let doc: ObjectsDocument = serde_json::from_str(json).unwrap();
        let result = ObjectStore::from_document(doc);
        assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
    }

    #[test]
    fn test_document_with_copy_cycle_is_rejected() {
        let json = r#"{
            "rootObjectId": "root",
            "objects": {
                "root": { "id": "root", "type": "card", "childIds": { "a": true, "b": true } },
                "a": { "id": "a", "type": "field", "parentId": "root", "copyOfId": "b" },
                "b": { "id": "b", "type": "field", "parentId": "root", "copyOfId": "a" }
            }
        }"#;

        let doc: ObjectsDocument = serde_json::from_str(json).unwrap();
        assert!(ObjectStore::from_document(doc).is_err());
    }
}
