//! # Document Handle
//!
//! A Document is the in-process document store: the current object store,
//! a version counter, and the snapshots rule evaluation needs as
//! authoring-time baselines.
//!
//! Documents can be:
//! - **Memory-backed**: Temporary, for testing or in-memory operations
//! - **File-backed**: Loaded from and saved to a JSON file
//!
//! ## Lifecycle
//!
//! ```text
//! Load → Change → Evaluate → Save
//!   ↓       ↓         ↓        ↓
//! JSON    Store   Evaluation  JSON
//! ```

use crate::{EditorError, Mutation, MutationResult};
use cardboard_evaluator::{EngineConfig, Evaluation, RuleEngine, RuleResult};
use cardboard_model::{ObjectId, ObjectStore, ObjectsDocument, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

/// Editable Cardboard document
#[derive(Debug)]
pub struct Document {
    /// Path to the JSON file (if any)
    pub path: PathBuf,

    /// Current version number (increments on each change)
    version: u64,

    store: ObjectStore,

    /// Pinned past states, keyed by the version they were taken at
    snapshots: BTreeMap<u64, ObjectStore>,

    storage: DocumentStorage,

    engine: RuleEngine,

    evaluation: Evaluation,

    /// Version `evaluation` was computed for
    evaluated_version: Option<u64>,
}

/// Storage backend for document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStorage {
    /// In-memory only (for testing, temp docs)
    Memory,

    /// File-backed
    File { dirty: bool },
}

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedDocument {
    version: u64,
    document: ObjectsDocument,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    snapshots: Vec<SavedSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedSnapshot {
    version: u64,
    document: ObjectsDocument,
}

impl Document {
    /// Empty memory-backed document holding only the root card
    pub fn new(path: PathBuf) -> Self {
        Self::from_store(path, ObjectStore::new())
    }

    pub fn from_store(path: PathBuf, store: ObjectStore) -> Self {
        Self {
            path,
            version: 0,
            evaluation: Evaluation::empty(&store),
            evaluated_version: None,
            store,
            snapshots: BTreeMap::new(),
            storage: DocumentStorage::Memory,
            engine: RuleEngine::default(),
        }
    }

    /// Create document from JSON text (memory-backed).
    ///
    /// Accepts the saved envelope or a bare objects document. Anything with a
    /// `document` key is read as an envelope.
    pub fn from_json(path: PathBuf, json: &str) -> Result<Self, EditorError> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        let saved = if raw.get("document").is_some() {
            serde_json::from_value::<SavedDocument>(raw)?
        } else {
            SavedDocument {
                version: 0,
                document: serde_json::from_value::<ObjectsDocument>(raw)?,
                snapshots: Vec::new(),
            }
        };

        let mut snapshots = BTreeMap::new();
        for snapshot in saved.snapshots {
            snapshots.insert(snapshot.version, ObjectStore::from_document(snapshot.document)?);
        }

        let mut doc = Self::from_store(path, ObjectStore::from_document(saved.document)?);
        doc.version = saved.version;
        doc.snapshots = snapshots;
        Ok(doc)
    }

    /// Load document from file (file-backed)
    pub fn load(path: PathBuf) -> Result<Self, EditorError> {
        let json = std::fs::read_to_string(&path)?;
        let mut doc = Self::from_json(path, &json)?;
        doc.storage = DocumentStorage::File { dirty: false };

        info!(path = %doc.path.display(), version = doc.version, objects = doc.store.len(), "Loaded document");
        Ok(doc)
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = RuleEngine::new(config);
        self.evaluated_version = None;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn storage(&self) -> DocumentStorage {
        self.storage
    }

    /// Current state
    pub fn snapshot(&self) -> &ObjectStore {
        &self.store
    }

    pub fn snapshots(&self) -> &BTreeMap<u64, ObjectStore> {
        &self.snapshots
    }

    /// Run `mutator` against the store as one change.
    ///
    /// On success the version is bumped. On failure the store is restored
    /// and the version is unchanged.
    pub fn change<T, E, F>(&mut self, mutator: F) -> Result<T, E>
    where
        F: FnOnce(&mut ObjectStore) -> Result<T, E>,
    {
        let before = self.store.clone();

        match mutator(&mut self.store) {
            Ok(value) => {
                self.version += 1;
                self.mark_dirty();
                self.prune_snapshots();
                debug!(version = self.version, "Document changed");
                Ok(value)
            }
            Err(err) => {
                self.store = before;
                Err(err)
            }
        }
    }

    /// Apply an editing intent
    pub fn apply(&mut self, mutation: Mutation) -> Result<MutationResult, EditorError> {
        let created = self.change(|store| mutation.apply(store))?;

        Ok(MutationResult {
            version: self.version,
            created,
        })
    }

    /// Keep a copy of the current state so later evaluations can compare against it
    pub fn pin_snapshot(&mut self) -> u64 {
        self.snapshots
            .entry(self.version)
            .or_insert_with(|| self.store.clone());
        self.version
    }

    /// Evaluate rules for the current version.
    ///
    /// Results are cached per version. Exceptions found are recorded on the
    /// rules that raised them without creating a new version.
    pub fn evaluate(&mut self) -> &Evaluation {
        self.refresh();
        &self.evaluation
    }

    /// Effective property value after rules
    pub fn resolved_property(&mut self, id: &ObjectId, key: &str) -> Option<Value> {
        self.refresh();
        self.evaluation.property(&self.store, id, key)
    }

    /// Displayed value of a field, computing its formula if it has one
    pub fn field_value(&mut self, field_id: &ObjectId) -> RuleResult<Value> {
        self.refresh();
        self.evaluation.field_value(&self.store, field_id)
    }

    fn refresh(&mut self) {
        if self.evaluated_version == Some(self.version) {
            return;
        }

        self.evaluation = self.engine.evaluate(&self.store, &self.snapshots);
        if self.evaluation.write_exceptions(&mut self.store) {
            self.mark_dirty();
        }
        self.evaluated_version = Some(self.version);
    }

    /// Check if document has unsaved changes
    pub fn is_dirty(&self) -> bool {
        matches!(self.storage, DocumentStorage::File { dirty: true })
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        let saved = SavedDocument {
            version: self.version,
            document: self.store.to_document(),
            snapshots: self
                .snapshots
                .iter()
                .map(|(version, store)| SavedSnapshot {
                    version: *version,
                    document: store.to_document(),
                })
                .collect(),
        };

        Ok(serde_json::to_string_pretty(&saved)?)
    }

    /// Save document to disk (if file-backed)
    pub fn save(&mut self) -> Result<(), EditorError> {
        if self.storage == DocumentStorage::Memory {
            return Err(EditorError::NotFileBacked);
        }

        std::fs::write(&self.path, self.to_json()?)?;
        self.storage = DocumentStorage::File { dirty: false };

        info!(path = %self.path.display(), version = self.version, "Saved document");
        Ok(())
    }

    /// Write to `path` and keep the document file-backed from now on
    pub fn save_as(&mut self, path: PathBuf) -> Result<(), EditorError> {
        self.path = path;
        self.storage = DocumentStorage::File { dirty: true };
        self.save()
    }

    fn mark_dirty(&mut self) {
        if let DocumentStorage::File { dirty } = &mut self.storage {
            *dirty = true;
        }
    }

    /// Drop snapshots no rule refers to anymore
    fn prune_snapshots(&mut self) {
        let referenced: BTreeSet<u64> = self
            .store
            .iter()
            .filter_map(|record| record.rule.as_ref())
            .map(|rule| rule.created_at_version)
            .collect();

        self.snapshots.retain(|version, _| referenced.contains(version));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardboard_model::{IdGenerator, ObjectKind, Properties};

    fn document() -> Document {
        Document::from_store(
            PathBuf::from("test.json"),
            ObjectStore::with_id_generator(IdGenerator::sequential("d")),
        )
    }

    #[test]
    fn test_create_memory_document() {
        let doc = Document::new(PathBuf::from("test.json"));

        assert_eq!(doc.version(), 0);
        assert!(!doc.is_dirty());
        assert_eq!(doc.snapshot().len(), 1);
    }

    #[test]
    fn test_document_version_increments() {
        let mut doc = document();

        let result = doc
            .apply(Mutation::CreateObject {
                kind: ObjectKind::Card,
                parent_id: None,
                properties: Properties::new(),
            })
            .unwrap();

        assert_eq!(result.version, 1);
        assert_eq!(result.created, Some(ObjectId::from("d-2")));
    }

    #[test]
    fn test_failed_change_rolls_back() {
        let mut doc = document();

        let result: Result<(), &str> = doc.change(|store| {
            store.create(ObjectKind::Card, Properties::new(), None).unwrap();
            Err("abort")
        });

        assert!(result.is_err());
        assert_eq!(doc.version(), 0);
        assert_eq!(doc.snapshot().len(), 1);
    }

    #[test]
    fn test_unreferenced_snapshots_are_pruned() {
        let mut doc = document();
        doc.pin_snapshot();
        assert_eq!(doc.snapshots().len(), 1);

        doc.apply(Mutation::CreateObject {
            kind: ObjectKind::Field,
            parent_id: None,
            properties: Properties::new(),
        })
        .unwrap();
        assert!(doc.snapshots().is_empty());
    }

    #[test]
    fn test_evaluation_is_cached_per_version() {
        let mut doc = document();
        let first = doc.evaluate().clone();
        let second = doc.evaluate().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_memory_document_cannot_save() {
        let mut doc = document();
        assert!(matches!(doc.save(), Err(EditorError::NotFileBacked)));
    }

    #[test]
    fn test_bare_objects_document_loads() {
        let json = r#"{
            "rootObjectId": "root",
            "objects": {
                "root": { "id": "root", "type": "card", "x": 0, "y": 0, "childIds": { "f": true } },
                "f": { "id": "f", "type": "field", "parentId": "root", "value": "hi" }
            }
        }"#;

        let doc = Document::from_json(PathBuf::from("doc.json"), json).unwrap();
        assert_eq!(doc.version(), 0);
        assert_eq!(
            doc.snapshot().explicit_property(&ObjectId::from("f"), "value"),
            Some(&Value::from("hi"))
        );
    }

    #[test]
    fn test_corrupt_envelope_reports_envelope_error() {
        let mut doc = document();
        doc.apply(Mutation::CreateObject {
            kind: ObjectKind::Card,
            parent_id: None,
            properties: Properties::new(),
        })
        .unwrap();

        let mut saved: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        saved["snapshots"] = serde_json::json!([{ "version": "one" }]);

        let err = Document::from_json(PathBuf::from("doc.json"), &saved.to_string()).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, EditorError::Json(_)));
        assert!(!message.contains("rootObjectId"), "{}", message);
    }
}
