//! # Copy Tracker
//!
//! Queries over the copy-of relation. A copy of a copy is a copy of the
//! original: the relation is the transitive closure of `copy_of_id`.

use crate::{ObjectId, ObjectRecord, ObjectStore};

/// Iterator over `id`, its source, its source's source, ...
///
/// Stops at the first object with no `copy_of_id` or at the first dangling
/// link (the source was deleted). Bounded by the store size.
pub struct CopyChain<'a> {
    store: &'a ObjectStore,
    next: Option<&'a ObjectId>,
    remaining: usize,
}

impl<'a> Iterator for CopyChain<'a> {
    type Item = &'a ObjectRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let record = self.store.get(self.next?).ok()?;
        self.next = record.copy_of_id.as_ref();
        Some(record)
    }
}

/// The copy chain starting at `id` itself
pub fn copy_chain<'a>(store: &'a ObjectStore, id: &'a ObjectId) -> CopyChain<'a> {
    CopyChain {
        store,
        next: Some(id),
        remaining: store.len(),
    }
}

/// Reflexive, transitive copy-of test
pub fn is_copy_of(store: &ObjectStore, candidate: &ObjectId, original: &ObjectId) -> bool {
    if candidate == original {
        return true;
    }

    copy_chain(store, candidate)
        .skip(1)
        .any(|record| &record.id == original)
}

/// The oldest live ancestor in the copy chain
pub fn copy_root<'a>(store: &'a ObjectStore, id: &'a ObjectId) -> Option<&'a ObjectRecord> {
    copy_chain(store, id).last()
}

/// Every live object that is a (transitive) copy of `original`, excluding itself
pub fn copies_of<'a>(store: &'a ObjectStore, original: &ObjectId) -> Vec<&'a ObjectRecord> {
    store
        .iter()
        .filter(|record| &record.id != original && is_copy_of(store, &record.id, original))
        .collect()
}
