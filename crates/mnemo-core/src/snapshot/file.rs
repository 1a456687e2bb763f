use serde::{Deserialize, Serialize};

use mnemo_types::chunk_id::ChunkId;
use mnemo_types::file_id::FileId;

/// A decoded chunk: content-addressed bytes.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub data: Vec<u8>,
}

impl Chunk {
    /// Build a chunk from its content, computing the id.
    pub fn from_data(data: Vec<u8>) -> Self {
        let id = ChunkId::compute(&data);
        Self { id, data }
    }
}

/// Metadata record for one logical file at one point in time.
///
/// Stored content-addressed under `objects/` like chunks; the id covers the
/// path, size, modification time and the ordered chunk list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Logical path with a single leading separator.
    pub path: String,
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch.
    pub updated: i64,
    /// The file's content, in order.
    pub chunks: Vec<ChunkId>,
}

impl FileRecord {
    pub fn new(path: String, size: u64, updated: i64, chunks: Vec<ChunkId>) -> Self {
        let id = Self::compute_id(&path, size, updated, &chunks);
        Self {
            id,
            path,
            size,
            updated,
            chunks,
        }
    }

    /// Content hash over metadata plus the ordered chunk ids.
    pub fn compute_id(path: &str, size: u64, updated: i64, chunks: &[ChunkId]) -> FileId {
        let mut canonical = Vec::with_capacity(path.len() + 17 + chunks.len() * 20);
        canonical.extend_from_slice(path.as_bytes());
        canonical.push(0);
        canonical.extend_from_slice(&size.to_le_bytes());
        canonical.extend_from_slice(&updated.to_le_bytes());
        for chunk in chunks {
            canonical.extend_from_slice(&chunk.0);
        }
        FileId::compute(&canonical)
    }
}
