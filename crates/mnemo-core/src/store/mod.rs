use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use mnemo_types::chunk_id::ChunkId;
use mnemo_types::file_id::FileId;
use mnemo_types::snapshot_id::SnapshotId;

use crate::compress::{self, Compression};
use crate::crypto::CryptoEngine;
use crate::error::{MnemoError, Result};
use crate::fsutil;
use crate::snapshot::file::{Chunk, FileRecord};
use crate::snapshot::Snapshot;

/// The local content-addressed object store.
///
/// Layout under the repository root:
/// - `objects/<first-2-hex>/<remaining-38-hex>`: chunks and file records
/// - `indexes/<40-hex>`: snapshot records
/// - `refs/<name>`: textual 40-hex snapshot ids
///
/// Objects are stored encoded: compressed then encrypted. The raw (encoded)
/// bytes double as the cloud wire format, so upload and download move
/// objects without re-coding them.
pub struct ObjectStore {
    root: PathBuf,
    compression: Compression,
    crypto: Box<dyn CryptoEngine>,
}

impl ObjectStore {
    pub fn open(
        root: &Path,
        compression: Compression,
        crypto: Box<dyn CryptoEngine>,
    ) -> Result<Self> {
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("indexes"))?;
        fs::create_dir_all(root.join("refs"))?;
        Ok(Self {
            root: root.to_path_buf(),
            compression,
            crypto,
        })
    }

    /// Storage key of a content-addressed object, shared with the cloud side.
    pub fn object_key(hex: &str) -> String {
        format!("objects/{}/{}", &hex[..2], &hex[2..])
    }

    /// Storage key of a snapshot record.
    pub fn index_key(id: &SnapshotId) -> String {
        format!("indexes/{}", id.to_hex())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Compress then encrypt.
    pub fn encode(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let compressed = compress::compress(self.compression, plain)?;
        self.crypto.encrypt(&compressed)
    }

    /// Decrypt then decompress.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = self.crypto.decrypt(data)?;
        compress::decompress(&compressed)
    }

    /// Read an object's encoded bytes. `None` when absent.
    pub fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an object's encoded bytes atomically.
    pub fn write_raw(&self, key: &str, data: &[u8]) -> Result<()> {
        fsutil::write_atomic(&self.path_for(key), data)?;
        Ok(())
    }

    pub fn has_object(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    pub fn delete_object(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    /// Store a chunk. Writes to the same id are idempotent.
    pub fn put_chunk(&self, chunk: &Chunk) -> Result<()> {
        let key = Self::object_key(&chunk.id.to_hex());
        if self.has_object(&key) {
            return Ok(());
        }
        let encoded = self.encode(&chunk.data)?;
        self.write_raw(&key, &encoded)
    }

    /// Fetch and decode a chunk. `None` on a local miss.
    pub fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        let key = Self::object_key(&id.to_hex());
        let Some(raw) = self.read_raw(&key)? else {
            return Ok(None);
        };
        let data = self.decode(&raw)?;
        Ok(Some(Chunk { id: *id, data }))
    }

    pub fn has_chunk(&self, id: &ChunkId) -> bool {
        self.has_object(&Self::object_key(&id.to_hex()))
    }

    // ------------------------------------------------------------------
    // File records
    // ------------------------------------------------------------------

    pub fn put_file(&self, file: &FileRecord) -> Result<()> {
        let key = Self::object_key(&file.id.to_hex());
        if self.has_object(&key) {
            return Ok(());
        }
        let encoded = self.encode(&serde_json::to_vec(file)?)?;
        self.write_raw(&key, &encoded)
    }

    pub fn get_file(&self, id: &FileId) -> Result<Option<FileRecord>> {
        let Some(raw) = self.read_raw(&Self::object_key(&id.to_hex()))? else {
            return Ok(None);
        };
        let record: FileRecord = serde_json::from_slice(&self.decode(&raw)?)?;
        Ok(Some(record))
    }

    pub fn require_file(&self, id: &FileId) -> Result<FileRecord> {
        self.get_file(id)?
            .ok_or_else(|| MnemoError::ObjectNotFound(id.to_hex()))
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let encoded = self.encode(&serde_json::to_vec(snapshot)?)?;
        self.write_raw(&Self::index_key(&snapshot.id), &encoded)
    }

    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        let Some(raw) = self.read_raw(&Self::index_key(id))? else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_slice(&self.decode(&raw)?)?;
        Ok(Some(snapshot))
    }

    pub fn require_snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.get_snapshot(id)?
            .ok_or_else(|| MnemoError::SnapshotNotFound(id.to_hex()))
    }

    /// Ids of every snapshot record present locally.
    pub fn list_snapshot_ids(&self) -> Result<Vec<SnapshotId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join("indexes"))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(id) = name.parse::<SnapshotId>() {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Refs
    // ------------------------------------------------------------------

    pub fn read_ref(&self, name: &str) -> Result<Option<SnapshotId>> {
        let path = self.root.join("refs").join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let id = text.trim().parse::<SnapshotId>()?;
        Ok(Some(id))
    }

    pub fn write_ref(&self, name: &str, id: &SnapshotId) -> Result<()> {
        let path = self.root.join("refs").join(name);
        fsutil::write_atomic(&path, id.to_hex().as_bytes())?;
        debug!(name, snapshot = %id, "ref updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Enumeration (garbage collection)
    // ------------------------------------------------------------------

    /// The 40-hex ids of every object under `objects/`.
    pub fn list_object_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let objects = self.root.join("objects");
        for shard in fs::read_dir(&objects)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().to_string();
            if prefix.len() != 2 {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let rest = entry.file_name().to_string_lossy().to_string();
                if rest.len() == 38 {
                    ids.push(format!("{prefix}{rest}"));
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
