use std::sync::Arc;

use thiserror::Error;

use mnemo_types::chunk_id::ChunkId;
use mnemo_types::snapshot_id::SnapshotId;

pub type Result<T> = std::result::Result<T, MnemoError>;

#[derive(Debug, Error)]
pub enum MnemoError {
    #[error("lazy manifest is corrupt: {0}")]
    ManifestCorrupt(String),

    #[error("failed to persist lazy manifest: {0}")]
    ManifestPersistence(String),

    #[error("path not present in lazy manifest: '{0}'")]
    NotInManifest(String),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("chunk not found locally or on remote: {0}")]
    ChunkMissing(ChunkId),

    #[error("reassembled content does not match the expected size or hash for '{0}'")]
    IntegrityMismatch(String),

    #[error("failed to upload chunk {0}")]
    UploadFailure(ChunkId),

    #[error("object not found in store: {0}")]
    ObjectNotFound(String),

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("corrupt snapshot {0}: a file id appears in both files and lazyFiles")]
    SnapshotCorrupt(SnapshotId),

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("unknown compression tag: {0}")]
    UnknownCompressionTag(u8),

    #[error("invalid object id: {0}")]
    InvalidId(#[from] mnemo_types::ParseIdError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure first hit by another caller of the same in-flight load.
    #[error(transparent)]
    Shared(#[from] Arc<MnemoError>),

    #[error("{0}")]
    Other(String),
}
