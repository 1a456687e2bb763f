use tracing::{debug, error, info, warn};

use mnemo_types::file_id::FileId;
use mnemo_types::snapshot_id::SnapshotId;

use crate::checkout;
use crate::cloud::CloudBackend;
use crate::error::{MnemoError, Result};
use crate::lazy::manifest::MergeStats;
use crate::repo::{Repository, LATEST_REF};
use crate::snapshot::file::FileRecord;
use crate::store::ObjectStore;

const REMOTE_LATEST_KEY: &str = "refs/latest";

#[derive(Debug, Clone, Copy, Default)]
pub struct PushStats {
    pub uploaded_chunks: usize,
    pub uploaded_files: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PullStats {
    pub downloaded_chunks: usize,
    /// Outcome of the lazy-manifest merge.
    pub lazy: MergeStats,
    pub snapshot: Option<SnapshotId>,
    /// True when the remote snapshot matched the manifest's high-water mark
    /// and the manifest merge was skipped.
    pub unchanged: bool,
}

/// Upload the snapshot at `refs/latest` to the remote.
///
/// Chunk completeness comes first: every chunk referenced by any file in
/// `files ∪ lazy_files` must reach the remote before the snapshot object
/// and the ref do. A failed chunk upload fails the whole push: the remote
/// must never hold a snapshot with dangling references.
pub(crate) fn push(repo: &Repository) -> Result<PushStats> {
    let cloud = repo
        .cloud()
        .ok_or_else(|| MnemoError::RemoteUnavailable("no remote configured".into()))?;
    let id = repo
        .store()
        .read_ref(LATEST_REF)?
        .ok_or_else(|| MnemoError::SnapshotNotFound("latest".into()))?;
    let snapshot = repo.store().require_snapshot(&id)?;
    snapshot.validate()?;

    let mut stats = PushStats::default();

    for file_id in snapshot.all_files() {
        let record = repo.store().require_file(file_id)?;

        for chunk_id in &record.chunks {
            let key = ObjectStore::object_key(&chunk_id.to_hex());
            if cloud.exists(&key)? {
                continue;
            }
            let raw = repo
                .store()
                .read_raw(&key)?
                .ok_or(MnemoError::ChunkMissing(*chunk_id))?;
            cloud.upload_object(&key, &raw).map_err(|e| {
                error!(chunk = %chunk_id, path = %record.path, error = %e, "chunk upload failed");
                MnemoError::UploadFailure(*chunk_id)
            })?;
            stats.uploaded_chunks += 1;
        }

        let file_key = ObjectStore::object_key(&file_id.to_hex());
        if !cloud.exists(&file_key)? {
            let raw = repo
                .store()
                .read_raw(&file_key)?
                .ok_or_else(|| MnemoError::ObjectNotFound(file_id.to_hex()))?;
            cloud.upload_object(&file_key, &raw)?;
            stats.uploaded_files += 1;
        }
    }

    let index_key = ObjectStore::index_key(&id);
    if !cloud.exists(&index_key)? {
        let raw = repo
            .store()
            .read_raw(&index_key)?
            .ok_or_else(|| MnemoError::SnapshotNotFound(id.to_hex()))?;
        cloud.upload_object(&index_key, &raw)?;
    }
    cloud.upload_object(REMOTE_LATEST_KEY, id.to_hex().as_bytes())?;

    info!(
        snapshot = %id,
        chunks = stats.uploaded_chunks,
        files = stats.uploaded_files,
        "push finished"
    );
    Ok(stats)
}

/// Bring this device up to the remote's `refs/latest`.
///
/// Chunk data is downloaded for normal files only. Lazy files contribute
/// their records to the manifest through the conflict resolver; failures on
/// individual lazy records are logged and elided because manifest staleness
/// is recoverable on the next sync. Ends by moving the local ref and
/// materializing the snapshot.
pub(crate) fn pull(repo: &Repository) -> Result<PullStats> {
    let cloud = repo
        .cloud()
        .ok_or_else(|| MnemoError::RemoteUnavailable("no remote configured".into()))?;

    let Some(raw_ref) = cloud.download_object(REMOTE_LATEST_KEY)? else {
        debug!("remote has no snapshots yet");
        return Ok(PullStats::default());
    };
    let remote_id: SnapshotId = std::str::from_utf8(&raw_ref)
        .map_err(|_| MnemoError::Other("remote ref is not valid UTF-8".into()))?
        .trim()
        .parse()?;

    let snapshot = match repo.store().get_snapshot(&remote_id)? {
        Some(snapshot) => snapshot,
        None => {
            let key = ObjectStore::index_key(&remote_id);
            let raw = cloud
                .download_object(&key)?
                .ok_or_else(|| MnemoError::SnapshotNotFound(remote_id.to_hex()))?;
            repo.store().write_raw(&key, &raw)?;
            repo.store().require_snapshot(&remote_id)?
        }
    };
    snapshot.validate()?;

    let mut stats = PullStats {
        snapshot: Some(remote_id),
        ..PullStats::default()
    };

    // Normal files: records plus any chunk data missing locally.
    for file_id in &snapshot.files {
        let record = fetch_record(repo, cloud, file_id)?;
        for chunk_id in &record.chunks {
            if repo.store().has_chunk(chunk_id) {
                continue;
            }
            let key = ObjectStore::object_key(&chunk_id.to_hex());
            let raw = cloud
                .download_object(&key)?
                .ok_or(MnemoError::ChunkMissing(*chunk_id))?;
            repo.store().write_raw(&key, &raw)?;
            stats.downloaded_chunks += 1;
        }
    }

    // Lazy files: records only, merged into the manifest. No chunk data.
    if let Some(lazy) = repo.lazy() {
        if lazy.manifest.last_synced() == Some(remote_id) {
            debug!(snapshot = %remote_id, "manifest already synced to this snapshot");
            stats.unchanged = true;
        } else {
            let mut observed = Vec::new();
            for file_id in &snapshot.lazy_files {
                match fetch_record(repo, cloud, file_id) {
                    Ok(record) => observed.push(record),
                    Err(e) => {
                        warn!(file = %file_id, error = %e, "skipping lazy record during pull")
                    }
                }
            }
            stats.lazy = lazy.manifest.merge_observed(&observed, repo.data_root())?;
            lazy.manifest.set_last_synced(remote_id)?;
        }
    }

    repo.store().write_ref(LATEST_REF, &remote_id)?;
    let materialized = checkout::checkout(repo, &remote_id)?;

    info!(
        snapshot = %remote_id,
        chunks = stats.downloaded_chunks,
        materialized = materialized.materialized,
        lazy_new = stats.lazy.new,
        lazy_merged = stats.lazy.merged,
        "pull finished"
    );
    Ok(stats)
}

/// Resolve a file record: local store first, remote fallback. Downloads
/// fetch the record object only, never chunk data.
fn fetch_record(
    repo: &Repository,
    cloud: &dyn CloudBackend,
    file_id: &FileId,
) -> Result<FileRecord> {
    if let Some(record) = repo.store().get_file(file_id)? {
        return Ok(record);
    }
    let key = ObjectStore::object_key(&file_id.to_hex());
    let raw = cloud
        .download_object(&key)?
        .ok_or_else(|| MnemoError::ObjectNotFound(file_id.to_hex()))?;
    repo.store().write_raw(&key, &raw)?;
    repo.store().require_file(file_id)
}
