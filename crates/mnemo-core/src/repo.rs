use std::path::Path;
use std::sync::Arc;

use tracing::info;

use mnemo_types::snapshot_id::SnapshotId;

use crate::checkout::{self, CheckoutStats};
use crate::cloud::CloudBackend;
use crate::compress::Compression;
use crate::config::{ChunkerConfig, EngineConfig};
use crate::crypto;
use crate::diff::{self, Diff};
use crate::error::Result;
use crate::gc::{self, GcStats};
use crate::lazy::loader::{self, LoaderState};
use crate::lazy::manifest::ManifestStore;
use crate::lazy::patterns::LazyPatterns;
use crate::lazy::rebuild::{self, RebuildStats};
use crate::snapshot::{builder, Snapshot};
use crate::store::ObjectStore;
use crate::sync::{self, PullStats, PushStats};

/// Name of the ref tracking the most recent snapshot.
pub const LATEST_REF: &str = "latest";

/// Everything the lazy subsystem owns, per engine instance.
pub(crate) struct LazyContext {
    pub(crate) patterns: LazyPatterns,
    pub(crate) manifest: ManifestStore,
    pub(crate) loader: LoaderState,
}

/// A handle to an opened repository: the local object store, an optional
/// remote, and (when enabled) the lazy-asset subsystem.
///
/// Embedders hosting several data roots open one `Repository` per root;
/// there is no process-global state.
pub struct Repository {
    config: EngineConfig,
    store: ObjectStore,
    cloud: Option<Arc<dyn CloudBackend>>,
    lazy: Option<LazyContext>,
}

impl Repository {
    pub fn open(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_root)?;
        let compression = Compression::from_config(&config.compression);
        let crypto = crypto::engine_from_config(&config.encryption)?;
        let store = ObjectStore::open(&config.repo_path, compression, crypto)?;

        let lazy = if config.lazy_load_enabled {
            Some(LazyContext {
                patterns: LazyPatterns::compile(&config.lazy_patterns)?,
                manifest: ManifestStore::load(&config.data_root)?,
                loader: LoaderState::new(),
            })
        } else {
            None
        };

        info!(
            data_root = %config.data_root.display(),
            lazy_enabled = config.lazy_load_enabled,
            "repository opened"
        );
        Ok(Self {
            config,
            store,
            cloud: None,
            lazy,
        })
    }

    /// Attach a remote object store for push/pull and on-demand fetches.
    pub fn with_cloud(mut self, cloud: Arc<dyn CloudBackend>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn set_cloud(&mut self, cloud: Arc<dyn CloudBackend>) {
        self.cloud = Some(cloud);
    }

    pub(crate) fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub(crate) fn cloud(&self) -> Option<&dyn CloudBackend> {
        self.cloud.as_deref()
    }

    pub(crate) fn lazy(&self) -> Option<&LazyContext> {
        self.lazy.as_ref()
    }

    pub fn data_root(&self) -> &Path {
        &self.config.data_root
    }

    pub(crate) fn chunker_config(&self) -> &ChunkerConfig {
        &self.config.chunker
    }

    /// True when the lazy subsystem handles this path.
    pub fn is_lazy(&self, path: &str) -> bool {
        self.lazy
            .as_ref()
            .is_some_and(|lazy| lazy.patterns.is_lazy(path))
    }

    /// Capture a snapshot of the data root and advance `refs/latest`.
    pub fn snapshot(&self, memo: &str) -> Result<Snapshot> {
        builder::build_snapshot(self, memo)
    }

    /// Id of the most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<SnapshotId>> {
        self.store.read_ref(LATEST_REF)
    }

    /// Materialize a snapshot into the working tree (lazy paths stay absent).
    pub fn checkout(&self, id: &SnapshotId) -> Result<CheckoutStats> {
        checkout::checkout(self, id)
    }

    /// Path-level differences between two snapshots.
    pub fn diff(&self, left: &SnapshotId, right: &SnapshotId) -> Result<Diff> {
        diff::diff_snapshots(&self.store, left, right)
    }

    /// Upload the latest snapshot and everything it references.
    pub fn push(&self) -> Result<PushStats> {
        sync::push(self)
    }

    /// Bring this device up to the remote's latest snapshot.
    pub fn pull(&self) -> Result<PullStats> {
        sync::pull(self)
    }

    /// Realize a lazy path on first access, fetching chunks as needed.
    pub fn load(&self, path: &str) -> Result<()> {
        loader::load(self, path)
    }

    /// Whether a lazy path's bytes are present in the working tree.
    pub fn is_cached(&self, path: &str) -> bool {
        loader::is_cached(self, path)
    }

    /// Remove local bytes of cached lazy assets; manifest entries remain.
    pub fn clear_lazy_cache(&self) -> Result<usize> {
        match &self.lazy {
            Some(lazy) => lazy.manifest.clear_cached(self.data_root()),
            None => Ok(0),
        }
    }

    /// `(asset count, total logical bytes)` of the lazy manifest.
    pub fn lazy_stats(&self) -> (usize, u64) {
        self.lazy
            .as_ref()
            .map(|lazy| lazy.manifest.stats())
            .unwrap_or((0, 0))
    }

    /// Rebuild the lazy manifest from snapshot history when it is empty, or
    /// unconditionally when `force` is set.
    pub fn rebuild_lazy_index(&self, force: bool) -> Result<RebuildStats> {
        rebuild::ensure_complete(self, force)
    }

    /// Delete local objects unreachable from any snapshot or manifest entry.
    pub fn gc(&self) -> Result<GcStats> {
        gc::collect(self)
    }
}
