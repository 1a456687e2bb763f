pub mod builder;
pub mod file;

use serde::{Deserialize, Serialize};

use mnemo_types::file_id::FileId;
use mnemo_types::snapshot_id::SnapshotId;

use crate::error::{MnemoError, Result};

/// An immutable record of the data tree at a point in time, stored at
/// `indexes/<id>`.
///
/// `files` holds ids materialized normally on checkout; `lazyFiles` holds ids
/// whose bytes stay remote until first access. Both lists are optional on the
/// wire so snapshots written by older engines read back with empty lazy
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SnapshotId>,
    #[serde(default)]
    pub memo: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created: i64,
    /// Total logical bytes across all files.
    pub size: u64,
    /// Number of files (normal plus lazy).
    pub count: u64,
    pub files: Vec<FileId>,
    #[serde(rename = "lazyFiles", default, skip_serializing_if = "Vec::is_empty")]
    pub lazy_files: Vec<FileId>,
    /// Reserved for direct manifest attachment; readers tolerate absence.
    #[serde(rename = "lazyManifest", default, skip_serializing_if = "Option::is_none")]
    pub lazy_manifest: Option<String>,
}

impl Snapshot {
    pub(crate) fn new(
        parent: Option<SnapshotId>,
        memo: String,
        created: i64,
        size: u64,
        count: u64,
        files: Vec<FileId>,
        lazy_files: Vec<FileId>,
    ) -> Self {
        let id = Self::compute_id(parent.as_ref(), &memo, created, &files, &lazy_files);
        Self {
            id,
            parent,
            memo,
            created,
            size,
            count,
            files,
            lazy_files,
            lazy_manifest: None,
        }
    }

    fn compute_id(
        parent: Option<&SnapshotId>,
        memo: &str,
        created: i64,
        files: &[FileId],
        lazy_files: &[FileId],
    ) -> SnapshotId {
        let mut canonical = Vec::with_capacity(64 + (files.len() + lazy_files.len()) * 20);
        if let Some(parent) = parent {
            canonical.extend_from_slice(&parent.0);
        }
        canonical.push(0);
        canonical.extend_from_slice(memo.as_bytes());
        canonical.push(0);
        canonical.extend_from_slice(&created.to_le_bytes());
        for id in files {
            canonical.extend_from_slice(&id.0);
        }
        canonical.push(0xFF);
        for id in lazy_files {
            canonical.extend_from_slice(&id.0);
        }
        SnapshotId::compute(&canonical)
    }

    /// Every file id in the snapshot, normal first, then lazy.
    pub fn all_files(&self) -> impl Iterator<Item = &FileId> {
        self.files.iter().chain(self.lazy_files.iter())
    }

    /// A file id belongs to exactly one list; overlap is corruption.
    pub fn validate(&self) -> Result<()> {
        let normal: std::collections::HashSet<&FileId> = self.files.iter().collect();
        if self.lazy_files.iter().any(|id| normal.contains(id)) {
            return Err(MnemoError::SnapshotCorrupt(self.id));
        }
        Ok(())
    }
}
