use crate::state::SnapshotStore;
use crate::types::{ContentId, ContentSnapshot, Detection};

/// Classify `new` against the stored snapshot for `id` using exact string equality.
/// The store is not touched; writing the new snapshot is the caller's job.
pub fn detect(store: &SnapshotStore, id: &ContentId, new: &ContentSnapshot) -> Detection {
    match store.get(id) {
        None => Detection::Seeded,
        Some(previous) if previous == new => Detection::Unchanged,
        Some(previous) => Detection::Changed {
            previous: previous.clone(),
        },
    }
}
