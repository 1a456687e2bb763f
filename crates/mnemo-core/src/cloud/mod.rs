use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MnemoError, Result};
use crate::fsutil;

/// Abstract remote object storage, keyed by `/`-separated string paths that
/// mirror the local store layout (`objects/ab/…`, `indexes/…`, `refs/…`).
///
/// The remote is append-only from the engine's viewpoint: no delete surface.
/// `download_object` distinguishes an absent key (`Ok(None)`) from a
/// transport failure (`RemoteUnavailable`).
pub trait CloudBackend: Send + Sync {
    fn download_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an object. Idempotent for content-addressed keys.
    fn upload_object(&self, key: &str, data: &[u8]) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// List all keys under a prefix. Returns full key paths.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Filesystem-backed remote used by tests and local mirrors (e.g. a mounted
/// NAS path). Transport errors are plain I/O errors, surfaced as
/// `RemoteUnavailable` like any other backend's.
pub struct LocalCloud {
    root: PathBuf,
}

impl LocalCloud {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(transport_err)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn list_recursive(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir).map_err(transport_err)? {
            let entry = entry.map_err(transport_err)?;
            let file_type = entry.file_type().map_err(transport_err)?;
            if file_type.is_dir() {
                self.list_recursive(&entry.path(), keys)?;
            } else if file_type.is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

fn transport_err(e: std::io::Error) -> MnemoError {
    MnemoError::RemoteUnavailable(e.to_string())
}

impl CloudBackend for LocalCloud {
    fn download_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(transport_err(e)),
        }
    }

    fn upload_object(&self, key: &str, data: &[u8]) -> Result<()> {
        fsutil::write_atomic(&self.path_for(key), data).map_err(transport_err)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        match fs::metadata(self.path_for(key)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(transport_err(e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.path_for(prefix.trim_end_matches('/'));
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {
                let mut keys = Vec::new();
                self.list_recursive(&dir, &mut keys)?;
                keys.sort();
                Ok(keys)
            }
            Ok(_) => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(transport_err(e)),
        }
    }
}
