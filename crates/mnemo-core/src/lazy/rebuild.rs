use std::collections::HashMap;

use tracing::{debug, info, warn};

use mnemo_types::snapshot_id::SnapshotId;

use crate::error::Result;
use crate::paths;
use crate::repo::Repository;
use crate::snapshot::file::FileRecord;
use crate::snapshot::Snapshot;
use crate::store::ObjectStore;

/// Outcome of a manifest rebuild pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildStats {
    /// Snapshots scanned, local and remote.
    pub scanned: usize,
    /// Distinct lazy paths discovered.
    pub found: usize,
}

/// Rebuild the manifest from history when it is empty or when forced.
///
/// A device that lost its manifest (or enabled lazy loading after syncing)
/// can recover every historical lazy path this way.
pub(crate) fn ensure_complete(repo: &Repository, force: bool) -> Result<RebuildStats> {
    let Some(lazy) = repo.lazy() else {
        return Ok(RebuildStats::default());
    };
    if lazy.patterns.is_empty() {
        return Ok(RebuildStats::default());
    }
    let (count, _) = lazy.manifest.stats();
    if !force && count > 0 {
        debug!(assets = count, "lazy manifest appears complete");
        return Ok(RebuildStats::default());
    }
    rebuild(repo)
}

/// Scan every reachable snapshot, keep the newest record per lazy path, and
/// reconcile the findings into the manifest. Per-snapshot failures are
/// logged and skipped; the rebuild is best-effort by design.
pub(crate) fn rebuild(repo: &Repository) -> Result<RebuildStats> {
    let Some(lazy) = repo.lazy() else {
        return Ok(RebuildStats::default());
    };

    let mut newest: HashMap<String, FileRecord> = HashMap::new();
    let mut scanned = 0;

    for id in repo.store().list_snapshot_ids()? {
        match repo.store().get_snapshot(&id) {
            Ok(Some(snapshot)) => {
                scan_snapshot(repo, &snapshot, &mut newest);
                scanned += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(snapshot = %id, error = %e, "failed to read local snapshot"),
        }
    }

    if let Some(cloud) = repo.cloud() {
        match cloud.list("indexes/") {
            Ok(keys) => {
                for key in keys {
                    let hex = key.rsplit('/').next().unwrap_or(&key);
                    let Ok(id) = hex.parse::<SnapshotId>() else {
                        continue;
                    };
                    match repo.store().get_snapshot(&id) {
                        // Already scanned locally.
                        Ok(Some(_)) => continue,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(snapshot = %id, error = %e, "failed to probe local snapshot");
                            continue;
                        }
                    }
                    match fetch_remote_snapshot(repo, &key, &id) {
                        Ok(snapshot) => {
                            scan_snapshot(repo, &snapshot, &mut newest);
                            scanned += 1;
                        }
                        Err(e) => warn!(snapshot = %id, error = %e, "failed to fetch remote snapshot"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to list remote snapshots"),
        }
    }

    let records: Vec<FileRecord> = newest.into_values().collect();
    let found = records.len();
    let stats = lazy.manifest.merge_observed(&records, repo.data_root())?;
    info!(
        scanned,
        found,
        new = stats.new,
        merged = stats.merged,
        "lazy manifest rebuilt from snapshot history"
    );
    Ok(RebuildStats { scanned, found })
}

fn fetch_remote_snapshot(repo: &Repository, key: &str, id: &SnapshotId) -> Result<Snapshot> {
    let cloud = repo
        .cloud()
        .ok_or_else(|| crate::error::MnemoError::RemoteUnavailable("no remote configured".into()))?;
    let raw = cloud
        .download_object(key)?
        .ok_or_else(|| crate::error::MnemoError::ObjectNotFound(id.to_hex()))?;
    repo.store().write_raw(key, &raw)?;
    repo.store().require_snapshot(id)
}

/// Collect the newest record of every lazy-matching path in the snapshot.
/// Both lists are scanned: a path that was normal when the snapshot was
/// taken may match the patterns configured today.
fn scan_snapshot(repo: &Repository, snapshot: &Snapshot, newest: &mut HashMap<String, FileRecord>) {
    for file_id in snapshot.all_files() {
        let record = match repo.store().get_file(file_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Record object not present locally; fall back to the remote.
                match fetch_remote_record(repo, file_id) {
                    Some(record) => record,
                    None => continue,
                }
            }
            Err(e) => {
                warn!(file = %file_id, error = %e, "failed to read file record");
                continue;
            }
        };
        if !repo.is_lazy(&record.path) {
            continue;
        }
        let key = paths::logical(&record.path);
        let replace = newest
            .get(&key)
            .map(|prev| record.updated > prev.updated)
            .unwrap_or(true);
        if replace {
            newest.insert(key, record);
        }
    }
}

fn fetch_remote_record(
    repo: &Repository,
    file_id: &mnemo_types::file_id::FileId,
) -> Option<FileRecord> {
    let cloud = repo.cloud()?;
    let key = ObjectStore::object_key(&file_id.to_hex());
    let raw = match cloud.download_object(&key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(file = %file_id, error = %e, "failed to download file record");
            return None;
        }
    };
    if let Err(e) = repo.store().write_raw(&key, &raw) {
        warn!(file = %file_id, error = %e, "failed to cache file record");
    }
    match repo.store().get_file(file_id) {
        Ok(record) => record,
        Err(e) => {
            warn!(file = %file_id, error = %e, "failed to decode file record");
            None
        }
    }
}
