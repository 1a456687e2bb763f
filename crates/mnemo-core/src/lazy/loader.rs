use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, warn};

use mnemo_types::chunk_id::ChunkId;

use crate::error::{MnemoError, Result};
use crate::fsutil;
use crate::lazy::manifest::{LazyAsset, LazyStatus};
use crate::paths;
use crate::repo::Repository;
use crate::snapshot::file::Chunk;
use crate::store::ObjectStore;

type SharedResult = std::result::Result<(), Arc<MnemoError>>;

/// Completion gate for one in-flight fetch. The first caller performs the
/// work; everyone else blocks here and observes the same result.
struct Gate {
    done: Mutex<Option<SharedResult>>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            done: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn wait(&self) -> SharedResult {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = done.clone() {
                return result;
            }
            done = self.cv.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn finish(&self, result: SharedResult) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = Some(result);
        self.cv.notify_all();
    }
}

/// Per-repository loader state: the map of in-flight fetches.
///
/// The lock guards registration only; it is never held across store or
/// remote I/O.
pub(crate) struct LoaderState {
    in_flight: Mutex<HashMap<String, Arc<Gate>>>,
}

impl LoaderState {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

/// Realize a lazy path in the working tree, fetching its chunks on demand.
///
/// Concurrent calls for the same path coalesce onto one chunk-fetch stream;
/// an abandoned wait does not cancel the underlying work.
pub(crate) fn load(repo: &Repository, path: &str) -> Result<()> {
    let Some(lazy) = repo.lazy() else {
        return Err(MnemoError::NotInManifest(path.to_string()));
    };
    let key = paths::logical(path);
    let target = repo.data_root().join(paths::relative(&key));

    // Already materialized: just refresh the advisory status.
    if target.is_file() {
        if lazy.manifest.get(&key).is_some() {
            if let Err(e) = lazy.manifest.set_status(&key, LazyStatus::Cached) {
                warn!(path = %key, error = %e, "failed to persist cached status");
            }
        }
        return Ok(());
    }

    let Some(asset) = lazy.manifest.get(&key) else {
        return Err(MnemoError::NotInManifest(key));
    };

    // Register this load, or join the one already in flight.
    let (gate, is_owner) = {
        let mut in_flight = lazy
            .loader
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match in_flight.get(&key) {
            Some(gate) => (Arc::clone(gate), false),
            None => {
                let gate = Arc::new(Gate::new());
                in_flight.insert(key.clone(), Arc::clone(&gate));
                (gate, true)
            }
        }
    };

    if !is_owner {
        debug!(path = %key, "joining in-flight load");
        return gate.wait().map_err(MnemoError::Shared);
    }

    if let Err(e) = lazy.manifest.set_status(&key, LazyStatus::Downloading) {
        warn!(path = %key, error = %e, "failed to persist downloading status");
    }

    let outcome = fetch_and_materialize(repo, &asset, &target);

    let status = if outcome.is_ok() {
        LazyStatus::Cached
    } else {
        LazyStatus::Error
    };
    if let Err(e) = lazy.manifest.set_status(&key, status) {
        warn!(path = %key, error = %e, "failed to persist load status");
    }

    {
        let mut in_flight = lazy
            .loader
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&key);
    }
    match outcome {
        Ok(()) => {
            gate.finish(Ok(()));
            Ok(())
        }
        Err(e) => {
            let shared = Arc::new(e);
            gate.finish(Err(Arc::clone(&shared)));
            // With no waiters the gate (and its stored clone) drops here and
            // the concrete error unwraps back out; coalesced waiters keep the
            // Arc alive and the owner falls back to the shared wrapper.
            drop(gate);
            Err(Arc::try_unwrap(shared).unwrap_or_else(MnemoError::Shared))
        }
    }
}

/// Fetch every chunk (local store first, remote fallback), reassemble, and
/// write the file atomically. Nothing partial ever reaches the target path.
fn fetch_and_materialize(repo: &Repository, asset: &LazyAsset, target: &Path) -> Result<()> {
    let store = repo.store();
    let mut data = Vec::with_capacity(asset.size as usize);

    for chunk_id in &asset.chunks {
        match store.get_chunk(chunk_id)? {
            Some(chunk) => data.extend_from_slice(&chunk.data),
            None => {
                let bytes = fetch_remote_chunk(repo, chunk_id, &asset.path)?;
                data.extend_from_slice(&bytes);
            }
        }
    }

    if data.len() as u64 != asset.size {
        return Err(MnemoError::IntegrityMismatch(asset.path.clone()));
    }

    fsutil::write_atomic(target, &data)?;
    if let Err(e) = fsutil::set_file_mtime_ms(target, asset.modified) {
        warn!(path = %asset.path, error = %e, "failed to set mtime");
    }
    debug!(path = %asset.path, bytes = data.len(), chunks = asset.chunks.len(), "lazy asset materialized");
    Ok(())
}

/// Download one chunk from the remote, decode it, verify its id, and cache
/// it in the local store. Decode failures discard the bytes without caching.
fn fetch_remote_chunk(repo: &Repository, chunk_id: &ChunkId, asset_path: &str) -> Result<Vec<u8>> {
    let cloud = repo
        .cloud()
        .ok_or_else(|| MnemoError::RemoteUnavailable("no remote configured".into()))?;
    let key = ObjectStore::object_key(&chunk_id.to_hex());
    let raw = cloud
        .download_object(&key)?
        .ok_or(MnemoError::ChunkMissing(*chunk_id))?;
    let data = repo.store().decode(&raw)?;
    if ChunkId::compute(&data) != *chunk_id {
        warn!(chunk = %chunk_id, path = %asset_path, "downloaded chunk fails id verification");
        return Err(MnemoError::IntegrityMismatch(asset_path.to_string()));
    }
    repo.store().put_chunk(&Chunk {
        id: *chunk_id,
        data: data.clone(),
    })?;
    Ok(data)
}

/// Whether the asset's bytes are present in the working tree.
pub(crate) fn is_cached(repo: &Repository, path: &str) -> bool {
    repo.data_root().join(paths::relative(path)).is_file()
}
