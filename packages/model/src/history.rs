use crate::ObjectStore;
use std::collections::BTreeMap;

/// Read access to past document states, keyed by document version.
///
/// Rule evaluation compares current values against the state at the time a
/// rule was authored.
pub trait SnapshotHistory {
    fn snapshot_at(&self, version: u64) -> Option<&ObjectStore>;
}

/// History that remembers nothing. Every value counts as unchanged since authoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl SnapshotHistory for NoHistory {
    fn snapshot_at(&self, _version: u64) -> Option<&ObjectStore> {
        None
    }
}

impl SnapshotHistory for BTreeMap<u64, ObjectStore> {
    fn snapshot_at(&self, version: u64) -> Option<&ObjectStore> {
        self.get(&version)
    }
}
