use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::repo::Repository;
use crate::store::ObjectStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    pub reachable: usize,
    pub collected: usize,
}

/// Mark-and-sweep garbage collection over the local object store.
///
/// Roots are every local snapshot (both `files` and `lazy_files`, each
/// expanded to its chunk ids) plus every manifest asset (its file id and
/// chunks), so a lazy asset whose only reference lives in the manifest is
/// never collected. Unreachable objects are deleted.
pub(crate) fn collect(repo: &Repository) -> Result<GcStats> {
    let store = repo.store();
    let mut reachable: HashSet<String> = HashSet::new();

    for snapshot_id in store.list_snapshot_ids()? {
        let Some(snapshot) = store.get_snapshot(&snapshot_id)? else {
            continue;
        };
        for file_id in snapshot.all_files() {
            reachable.insert(file_id.to_hex());
            match store.get_file(file_id)? {
                Some(record) => {
                    for chunk_id in &record.chunks {
                        reachable.insert(chunk_id.to_hex());
                    }
                }
                None => {
                    // Record object never fetched (e.g. lazy entry from a
                    // partially-synced snapshot); nothing local to keep.
                    warn!(snapshot = %snapshot_id, file = %file_id, "snapshot references missing file record");
                }
            }
        }
    }

    if let Some(lazy) = repo.lazy() {
        for asset in lazy.manifest.assets() {
            reachable.insert(asset.file_id.to_hex());
            for chunk_id in &asset.chunks {
                reachable.insert(chunk_id.to_hex());
            }
        }
    }

    let mut collected = 0;
    for hex in store.list_object_ids()? {
        if !reachable.contains(&hex) {
            store.delete_object(&ObjectStore::object_key(&hex))?;
            collected += 1;
        }
    }

    info!(
        reachable = reachable.len(),
        collected, "garbage collection finished"
    );
    Ok(GcStats {
        reachable: reachable.len(),
        collected,
    })
}
