use crate::types::{ContentId, ContentSnapshot};
use std::collections::HashMap;
use tracing::debug;

/// Last-known snapshot per meeting. Lives for the whole process; nothing is evicted.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<ContentId, ContentSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ContentId) -> Option<&ContentSnapshot> {
        self.snapshots.get(id)
    }

    /// Replaces whatever was stored for `id`, returning the superseded snapshot.
    pub fn insert(&mut self, id: ContentId, snapshot: ContentSnapshot) -> Option<ContentSnapshot> {
        debug!("Storing snapshot for {} ({} bytes)", id, snapshot.len());
        self.snapshots.insert(id, snapshot)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.snapshots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
