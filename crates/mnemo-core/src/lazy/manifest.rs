use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mnemo_types::chunk_id::ChunkId;
use mnemo_types::file_id::FileId;
use mnemo_types::snapshot_id::SnapshotId;

use crate::error::{MnemoError, Result};
use crate::fsutil;
use crate::paths;
use crate::snapshot::file::FileRecord;

/// Location of the manifest relative to the data root.
pub const MANIFEST_RELATIVE_PATH: &str = ".siyuan/lazy_manifest.json";

const MANIFEST_VERSION: &str = "1.0";

/// Hydration state of a lazy asset. Advisory: derived from working-tree
/// presence, never load-bearing for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum LazyStatus {
    #[default]
    Pending,
    Downloading,
    Cached,
    Error,
}

impl From<i64> for LazyStatus {
    fn from(value: i64) -> Self {
        match value {
            1 => LazyStatus::Downloading,
            2 => LazyStatus::Cached,
            3 => LazyStatus::Error,
            // Unknown status values from newer writers read as Pending.
            _ => LazyStatus::Pending,
        }
    }
}

impl From<LazyStatus> for i64 {
    fn from(value: LazyStatus) -> Self {
        match value {
            LazyStatus::Pending => 0,
            LazyStatus::Downloading => 1,
            LazyStatus::Cached => 2,
            LazyStatus::Error => 3,
        }
    }
}

/// One lazy path and the recipe to rebuild its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LazyAsset {
    pub path: String,
    #[serde(rename = "fileId")]
    pub file_id: FileId,
    pub size: u64,
    #[serde(default)]
    pub hash: String,
    /// Modification time, milliseconds since the Unix epoch.
    #[serde(rename = "mtime")]
    pub modified: i64,
    /// The file's content, in order.
    pub chunks: Vec<ChunkId>,
    #[serde(default)]
    pub status: LazyStatus,
}

impl LazyAsset {
    pub fn from_record(file: &FileRecord, status: LazyStatus) -> Self {
        Self {
            path: paths::logical(&file.path),
            file_id: file.id,
            size: file.size,
            hash: String::new(),
            modified: file.updated,
            chunks: file.chunks.clone(),
            status,
        }
    }
}

/// The on-disk manifest: every lazy path this device knows about.
///
/// `lastSyncedSnapshot` is the pull-side high-water mark; it is omitted when
/// unset so older readers of the schema see exactly the documented shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyManifest {
    pub version: String,
    pub assets: BTreeMap<String, LazyAsset>,
    /// Last-write time, milliseconds since the Unix epoch.
    pub updated: i64,
    #[serde(
        rename = "lastSyncedSnapshot",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced: Option<SnapshotId>,
}

impl LazyManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            assets: BTreeMap::new(),
            updated: Utc::now().timestamp_millis(),
            last_synced: None,
        }
    }
}

/// Counters from one reconciliation pass, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub new: usize,
    pub conflicted: usize,
    pub merged: usize,
}

/// Outcome of reconciling one observation against the manifest.
enum Verdict {
    New,
    Adopt,
    KeepExisting,
    Refresh,
}

/// Durable, lock-guarded store for the lazy manifest.
///
/// Reads take the reader lock; every mutation takes the writer lock and
/// saves before releasing it, so the on-disk state never lags a visible
/// in-memory state by more than one write. The save touches only local
/// disk, so holding the writer lock across it is safe.
pub struct ManifestStore {
    path: PathBuf,
    state: RwLock<LazyManifest>,
}

impl ManifestStore {
    /// Load the manifest from `<data_root>/.siyuan/lazy_manifest.json`.
    /// A missing file yields an empty manifest; malformed JSON is
    /// `ManifestCorrupt` and the caller decides whether to discard.
    pub fn load(data_root: &Path) -> Result<Self> {
        let path = data_root.join(MANIFEST_RELATIVE_PATH);
        let manifest = match fs::read(&path) {
            Ok(bytes) => {
                let mut manifest: LazyManifest = serde_json::from_slice(&bytes)
                    .map_err(|e| MnemoError::ManifestCorrupt(e.to_string()))?;
                canonicalize(&mut manifest);
                manifest
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LazyManifest::empty(),
            Err(e) => return Err(e.into()),
        };
        debug!(assets = manifest.assets.len(), "lazy manifest loaded");
        Ok(Self {
            path,
            state: RwLock::new(manifest),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LazyManifest> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LazyManifest> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn save_locked(&self, state: &mut LazyManifest) -> Result<()> {
        state.updated = Utc::now().timestamp_millis();
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| MnemoError::ManifestPersistence(e.to_string()))?;
        fsutil::write_atomic(&self.path, &bytes)
            .map_err(|e| MnemoError::ManifestPersistence(e.to_string()))
    }

    /// Look up a path, tolerating both spellings.
    pub fn get(&self, path: &str) -> Option<LazyAsset> {
        let state = self.read();
        lookup(&state.assets, path).cloned()
    }

    /// Insert or replace an asset, stored under the asset's own spelling.
    /// Any alternate-spelling entry for the same logical path is collapsed.
    pub fn put(&self, asset: LazyAsset) -> Result<()> {
        let mut state = self.write();
        insert(&mut state.assets, asset);
        self.save_locked(&mut state)
    }

    /// Remove an entry (either spelling). Returns whether one existed.
    pub fn delete(&self, path: &str) -> Result<bool> {
        let mut state = self.write();
        let direct = state.assets.remove(path).is_some();
        let alternate = state.assets.remove(&paths::alternate(path)).is_some();
        let removed = direct || alternate;
        if removed {
            self.save_locked(&mut state)?;
        }
        Ok(removed)
    }

    /// `(asset count, total logical bytes)`.
    pub fn stats(&self) -> (usize, u64) {
        let state = self.read();
        let total = state.assets.values().map(|a| a.size).sum();
        (state.assets.len(), total)
    }

    /// Every asset, in key order.
    pub fn assets(&self) -> Vec<LazyAsset> {
        self.read().assets.values().cloned().collect()
    }

    /// Update an entry's advisory status. A miss is a no-op.
    pub fn set_status(&self, path: &str, status: LazyStatus) -> Result<()> {
        let mut state = self.write();
        let Some(key) = lookup_key(&state.assets, path) else {
            return Ok(());
        };
        match state.assets.get_mut(&key) {
            Some(asset) if asset.status != status => asset.status = status,
            _ => return Ok(()),
        }
        self.save_locked(&mut state)
    }

    pub fn last_synced(&self) -> Option<SnapshotId> {
        self.read().last_synced
    }

    /// Record the pull-side high-water mark.
    pub fn set_last_synced(&self, id: SnapshotId) -> Result<()> {
        let mut state = self.write();
        if state.last_synced == Some(id) {
            return Ok(());
        }
        state.last_synced = Some(id);
        self.save_locked(&mut state)
    }

    /// Reconcile a batch of observed file records into the manifest.
    ///
    /// An observation conflicts with an existing entry when mtime, size,
    /// chunk count or any chunk id differ. Resolution is deterministic:
    /// newer `mtime` wins; on ties, differing size or chunks adopt the
    /// observation; otherwise the entry is left alone. Observations with no
    /// chunks but non-zero size are logged and skipped.
    pub fn merge_observed(&self, observed: &[FileRecord], data_root: &Path) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut state = self.write();

        for file in observed {
            if file.chunks.is_empty() && file.size > 0 {
                warn!(
                    path = %file.path,
                    size = file.size,
                    "observed lazy file has no chunks; skipping"
                );
                continue;
            }

            let status = presence_status(data_root, &file.path);
            let verdict = match lookup(&state.assets, &file.path) {
                None => Verdict::New,
                Some(existing) if !conflicts(existing, file) => Verdict::Refresh,
                Some(existing) => {
                    // Conflict. Newer mtime wins; on a tied mtime the
                    // differing size/chunks mark the observation as the
                    // later write to have reached this node.
                    if file.updated >= existing.modified {
                        Verdict::Adopt
                    } else {
                        Verdict::KeepExisting
                    }
                }
            };
            match verdict {
                Verdict::New => {
                    stats.new += 1;
                    insert(&mut state.assets, LazyAsset::from_record(file, status));
                }
                Verdict::Adopt => {
                    stats.conflicted += 1;
                    stats.merged += 1;
                    insert(&mut state.assets, LazyAsset::from_record(file, status));
                }
                Verdict::KeepExisting => {
                    stats.conflicted += 1;
                }
                Verdict::Refresh => {
                    // Same content; only refresh the advisory status.
                    if let Some(key) = lookup_key(&state.assets, &file.path) {
                        if let Some(asset) = state.assets.get_mut(&key) {
                            asset.status = status;
                        }
                    }
                }
            }
        }

        self.save_locked(&mut state)?;
        if stats.conflicted > 0 {
            info!(
                new = stats.new,
                conflicted = stats.conflicted,
                merged = stats.merged,
                "lazy manifest merge resolved conflicts"
            );
        } else {
            debug!(new = stats.new, "lazy manifest merge applied");
        }
        Ok(stats)
    }

    /// Remove the local bytes of every cached asset and reset its status to
    /// Pending. The manifest entries themselves remain so historical
    /// snapshots stay loadable. Returns how many files were removed.
    pub fn clear_cached(&self, data_root: &Path) -> Result<usize> {
        let mut state = self.write();
        let mut removed = 0;
        for asset in state.assets.values_mut() {
            let local = data_root.join(paths::relative(&asset.path));
            if !local.is_file() {
                continue;
            }
            match fs::remove_file(&local) {
                Ok(()) => {
                    asset.status = LazyStatus::Pending;
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %asset.path, error = %e, "failed to remove cached file");
                }
            }
        }
        if removed > 0 {
            self.save_locked(&mut state)?;
            info!(removed, "lazy cache cleared");
        }
        Ok(removed)
    }
}

fn presence_status(data_root: &Path, path: &str) -> LazyStatus {
    if data_root.join(paths::relative(path)).is_file() {
        LazyStatus::Cached
    } else {
        LazyStatus::Pending
    }
}

fn lookup<'a>(assets: &'a BTreeMap<String, LazyAsset>, path: &str) -> Option<&'a LazyAsset> {
    assets.get(path).or_else(|| assets.get(&paths::alternate(path)))
}

fn lookup_key(assets: &BTreeMap<String, LazyAsset>, path: &str) -> Option<String> {
    if assets.contains_key(path) {
        return Some(path.to_string());
    }
    let alt = paths::alternate(path);
    assets.contains_key(&alt).then_some(alt)
}

/// Insert an asset, collapsing any alternate-spelling entry for the same
/// logical path so one path never occupies two keys.
fn insert(assets: &mut BTreeMap<String, LazyAsset>, asset: LazyAsset) {
    assets.remove(&paths::alternate(&asset.path));
    assets.insert(asset.path.clone(), asset);
}

/// Rewrite every legacy key left behind by old writers to the
/// leading-separator spelling. When both spellings of one logical path are
/// present, the newest entry by `mtime` survives.
fn canonicalize(manifest: &mut LazyManifest) {
    let legacy_keys: Vec<String> = manifest
        .assets
        .keys()
        .filter(|k| !k.starts_with('/'))
        .cloned()
        .collect();

    for key in legacy_keys {
        let canonical = paths::logical(&key);
        let Some(legacy) = manifest.assets.remove(&key) else {
            continue;
        };
        let existing_wins = manifest
            .assets
            .get(&canonical)
            .is_some_and(|existing| existing.modified >= legacy.modified);
        if existing_wins {
            warn!(path = %canonical, "collapsed duplicate manifest spellings");
            continue;
        }
        let had_duplicate = manifest.assets.contains_key(&canonical);
        let mut winner = legacy;
        winner.path = canonical.clone();
        manifest.assets.insert(canonical.clone(), winner);
        if had_duplicate {
            warn!(path = %canonical, "collapsed duplicate manifest spellings");
        } else {
            debug!(path = %canonical, "rewrote legacy manifest key to canonical spelling");
        }
    }
}

/// True when the observation differs from the stored entry in any way that
/// matters: mtime, size, chunk count or per-chunk ids.
fn conflicts(asset: &LazyAsset, file: &FileRecord) -> bool {
    asset.modified != file.updated || asset.size != file.size || asset.chunks != file.chunks
}
