use std::collections::BTreeMap;

use mnemo_types::snapshot_id::SnapshotId;

use crate::error::Result;
use crate::paths;
use crate::snapshot::file::FileRecord;
use crate::snapshot::Snapshot;
use crate::store::ObjectStore;

/// Path-level differences between two snapshots.
///
/// Both `files` and `lazy_files` participate, so a lazy asset whose bytes
/// are absent from the working tree, but still listed via the manifest,
/// never shows up as removed.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    /// Present in `right` only. Records come from `right`.
    pub added: Vec<FileRecord>,
    /// Present in both with different file ids. Records come from `right`.
    pub modified: Vec<FileRecord>,
    /// Present in `left` only. Records come from `left`.
    pub removed: Vec<FileRecord>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Compare two snapshots by logical path.
pub(crate) fn diff_snapshots(
    store: &ObjectStore,
    left: &SnapshotId,
    right: &SnapshotId,
) -> Result<Diff> {
    let left_map = path_map(store, &store.require_snapshot(left)?)?;
    let right_map = path_map(store, &store.require_snapshot(right)?)?;

    let mut diff = Diff::default();
    for (path, record) in &right_map {
        match left_map.get(path) {
            None => diff.added.push(record.clone()),
            Some(prev) if prev.id != record.id => diff.modified.push(record.clone()),
            Some(_) => {}
        }
    }
    for (path, record) in &left_map {
        if !right_map.contains_key(path) {
            diff.removed.push(record.clone());
        }
    }
    Ok(diff)
}

fn path_map(store: &ObjectStore, snapshot: &Snapshot) -> Result<BTreeMap<String, FileRecord>> {
    let mut map = BTreeMap::new();
    for file_id in snapshot.all_files() {
        let record = store.require_file(file_id)?;
        map.insert(paths::logical(&record.path), record);
    }
    Ok(map)
}
