use tracing::{debug, warn};

use mnemo_types::snapshot_id::SnapshotId;

use crate::error::{MnemoError, Result};
use crate::fsutil;
use crate::paths;
use crate::repo::Repository;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutStats {
    pub materialized: usize,
    /// Files already present with matching size and mtime.
    pub up_to_date: usize,
    /// Lazy paths deliberately left absent.
    pub lazy_skipped: usize,
}

/// Materialize a snapshot's `files` into the working tree.
///
/// Paths in `lazy_files` are not materialized; they stay absent until a
/// `load` call asks for them. If a lazy path already has local bytes from an
/// earlier materialization, they are left in place; checkout never deletes.
pub(crate) fn checkout(repo: &Repository, id: &SnapshotId) -> Result<CheckoutStats> {
    let snapshot = repo.store().require_snapshot(id)?;
    snapshot.validate()?;

    let mut stats = CheckoutStats {
        lazy_skipped: snapshot.lazy_files.len(),
        ..CheckoutStats::default()
    };

    for file_id in &snapshot.files {
        let record = repo.store().require_file(file_id)?;
        let target = repo.data_root().join(paths::relative(&record.path));

        if let Ok(metadata) = target.metadata() {
            if metadata.is_file()
                && metadata.len() == record.size
                && fsutil::mtime_ms(&metadata) == record.updated
            {
                stats.up_to_date += 1;
                continue;
            }
        }

        let mut data = Vec::with_capacity(record.size as usize);
        for chunk_id in &record.chunks {
            let chunk = repo
                .store()
                .get_chunk(chunk_id)?
                .ok_or(MnemoError::ChunkMissing(*chunk_id))?;
            data.extend_from_slice(&chunk.data);
        }

        fsutil::write_atomic(&target, &data)?;
        if let Err(e) = fsutil::set_file_mtime_ms(&target, record.updated) {
            warn!(path = %record.path, error = %e, "failed to set mtime");
        }
        stats.materialized += 1;
    }

    debug!(
        snapshot = %id,
        materialized = stats.materialized,
        up_to_date = stats.up_to_date,
        lazy_skipped = stats.lazy_skipped,
        "checkout finished"
    );
    Ok(stats)
}
