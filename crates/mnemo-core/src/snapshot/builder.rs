use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::Utc;
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::chunker;
use crate::error::Result;
use crate::fsutil;
use crate::lazy::manifest::MANIFEST_RELATIVE_PATH;
use crate::paths;
use crate::repo::{Repository, LATEST_REF};
use crate::snapshot::file::{Chunk, FileRecord};
use crate::snapshot::Snapshot;

/// Build a snapshot of the data root and advance `refs/latest`.
///
/// Files are chunked and classified into `files` vs `lazy_files` by the
/// pattern matcher. Manifest entries whose bytes are absent from disk are
/// injected as synthetic records so a later diff never sees them as
/// deleted. Lazy files that are on disk are captured from their current
/// bytes; the refreshed records supersede the manifest entries.
pub(crate) fn build_snapshot(repo: &Repository, memo: &str) -> Result<Snapshot> {
    let data_root = repo.data_root();
    let parent = repo.store().read_ref(LATEST_REF)?;
    let prior = prior_records(repo, parent.as_ref())?;

    let mut files = Vec::new();
    let mut lazy_files = Vec::new();
    let mut observed_lazy = Vec::new();
    let mut seen = HashSet::new();
    let mut total_size = 0u64;
    let mut count = 0u64;

    let mut walker = WalkBuilder::new(data_root);
    walker
        .follow_links(false)
        .hidden(false)
        .ignore(false)
        .git_global(false)
        .git_exclude(false)
        .git_ignore(false)
        .parents(false)
        .require_git(false)
        .sort_by_file_name(std::ffi::OsStr::cmp);

    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping entry (walk error)");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(data_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if rel.is_empty() || rel == MANIFEST_RELATIVE_PATH {
            continue;
        }
        let logical = paths::logical(&rel);

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %logical, error = %e, "skipping entry (stat error)");
                continue;
            }
        };
        let updated = fsutil::mtime_ms(&metadata);

        let record = match reusable_record(repo, &prior, &logical, metadata.len(), updated) {
            Some(record) => record,
            None => match capture_file(repo, entry.path(), &logical, updated) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %logical, error = %e, "skipping file (read error)");
                    continue;
                }
            },
        };
        repo.store().put_file(&record)?;

        total_size += record.size;
        count += 1;
        seen.insert(logical);
        if repo.is_lazy(&record.path) {
            lazy_files.push(record.id);
            observed_lazy.push(record);
        } else {
            files.push(record.id);
        }
    }

    // Inject manifest entries whose bytes are not on disk, so the snapshot
    // still lists them and no ghost deletion can appear downstream.
    if let Some(lazy) = repo.lazy() {
        for asset in lazy.manifest.assets() {
            let key = paths::logical(&asset.path);
            if seen.contains(&key) {
                continue;
            }
            if asset.chunks.is_empty() {
                warn!(path = %asset.path, size = asset.size, "manifest entry has no chunks; not injecting");
                continue;
            }
            let record = FileRecord {
                id: asset.file_id,
                path: key,
                size: asset.size,
                updated: asset.modified,
                chunks: asset.chunks.clone(),
            };
            repo.store().put_file(&record)?;
            total_size += record.size;
            count += 1;
            lazy_files.push(record.id);
        }

        // Local bytes win over the device's own manifest.
        if !observed_lazy.is_empty() {
            let stats = lazy.manifest.merge_observed(&observed_lazy, data_root)?;
            debug!(
                new = stats.new,
                merged = stats.merged,
                "manifest absorbed on-disk lazy files"
            );
        }
    }

    let snapshot = Snapshot::new(
        parent,
        memo.to_string(),
        Utc::now().timestamp_millis(),
        total_size,
        count,
        files,
        lazy_files,
    );
    snapshot.validate()?;
    repo.store().put_snapshot(&snapshot)?;
    repo.store().write_ref(LATEST_REF, &snapshot.id)?;
    info!(
        id = %snapshot.id,
        files = snapshot.files.len(),
        lazy = snapshot.lazy_files.len(),
        "snapshot created"
    );
    Ok(snapshot)
}

/// Records of the parent snapshot, keyed by logical path, for unchanged-file
/// reuse.
fn prior_records(
    repo: &Repository,
    parent: Option<&mnemo_types::snapshot_id::SnapshotId>,
) -> Result<HashMap<String, FileRecord>> {
    let mut prior = HashMap::new();
    let Some(parent) = parent else {
        return Ok(prior);
    };
    let Some(snapshot) = repo.store().get_snapshot(parent)? else {
        return Ok(prior);
    };
    for file_id in snapshot.all_files() {
        if let Some(record) = repo.store().get_file(file_id)? {
            prior.insert(paths::logical(&record.path), record);
        }
    }
    Ok(prior)
}

/// Reuse a prior chunk list when size and mtime are unchanged: first against
/// the parent snapshot's record, then (for lazy paths) against the manifest.
fn reusable_record(
    repo: &Repository,
    prior: &HashMap<String, FileRecord>,
    logical: &str,
    size: u64,
    updated: i64,
) -> Option<FileRecord> {
    if let Some(prev) = prior.get(logical) {
        if prev.size == size && prev.updated == updated {
            return Some(prev.clone());
        }
    }
    let lazy = repo.lazy()?;
    let asset = lazy.manifest.get(logical)?;
    if asset.size == size && asset.modified == updated && !asset.chunks.is_empty() {
        return Some(FileRecord {
            id: asset.file_id,
            path: logical.to_string(),
            size,
            updated,
            chunks: asset.chunks,
        });
    }
    None
}

/// Chunk a file's current bytes and store every chunk.
fn capture_file(repo: &Repository, abs: &Path, logical: &str, updated: i64) -> Result<FileRecord> {
    let data = fs::read(abs)?;
    let spans = chunker::chunk_data(&data, repo.chunker_config());
    let mut chunks = Vec::with_capacity(spans.len());
    for (offset, length) in spans {
        let chunk = Chunk::from_data(data[offset..offset + length].to_vec());
        repo.store().put_chunk(&chunk)?;
        chunks.push(chunk.id);
    }
    Ok(FileRecord::new(
        logical.to_string(),
        data.len() as u64,
        updated,
        chunks,
    ))
}
