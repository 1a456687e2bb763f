use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::cloud::{CloudBackend, LocalCloud};
use crate::config::EngineConfig;
use crate::repo::Repository;

/// One simulated device: a data root and a local object store under a
/// shared tempdir.
pub struct TestDevice {
    // Held so the tempdir outlives the repository.
    _dir: TempDir,
    pub repo: Repository,
}

impl TestDevice {
    pub fn data_path(&self, rel: &str) -> PathBuf {
        self.repo.data_root().join(rel)
    }

    pub fn write_data(&self, rel: &str, data: &[u8]) {
        let path = self.data_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, data).unwrap();
    }

    pub fn read_data(&self, rel: &str) -> Vec<u8> {
        fs::read(self.data_path(rel)).unwrap()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.repo
            .data_root()
            .join(crate::lazy::manifest::MANIFEST_RELATIVE_PATH)
    }
}

pub fn lazy_config(base: &Path, patterns: &[&str]) -> EngineConfig {
    let mut config = EngineConfig::new(base.join("data"), base.join("repo"));
    config.lazy_patterns = patterns.iter().map(|p| p.to_string()).collect();
    config.lazy_load_enabled = true;
    config
}

/// Open a device with the given lazy patterns (empty slice = lazy disabled).
pub fn open_device(patterns: &[&str]) -> TestDevice {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::open(lazy_config(dir.path(), patterns)).unwrap();
    TestDevice { _dir: dir, repo }
}

/// Open a device wired to a shared cloud.
pub fn open_device_with_cloud(patterns: &[&str], cloud: Arc<dyn CloudBackend>) -> TestDevice {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::open(lazy_config(dir.path(), patterns))
        .unwrap()
        .with_cloud(cloud);
    TestDevice { _dir: dir, repo }
}

/// A filesystem cloud shared between devices. The tempdir keeps it alive.
pub fn shared_cloud() -> (TempDir, Arc<LocalCloud>) {
    let dir = tempfile::tempdir().unwrap();
    let cloud = Arc::new(LocalCloud::new(dir.path()).unwrap());
    (dir, cloud)
}
