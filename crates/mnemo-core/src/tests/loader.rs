use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mnemo_types::file_id::FileId;

use crate::cloud::CloudBackend;
use crate::error::{MnemoError, Result};
use crate::fsutil;
use crate::lazy::manifest::{LazyAsset, LazyStatus};
use crate::testutil::{lazy_config, open_device, open_device_with_cloud, shared_cloud};
use crate::Repository;

/// Counts chunk downloads passing through to an inner backend.
struct CountingCloud {
    inner: Arc<dyn CloudBackend>,
    chunk_downloads: AtomicUsize,
}

impl CountingCloud {
    fn new(inner: Arc<dyn CloudBackend>) -> Self {
        Self {
            inner,
            chunk_downloads: AtomicUsize::new(0),
        }
    }
}

impl CloudBackend for CountingCloud {
    fn download_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.starts_with("objects/") {
            self.chunk_downloads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.download_object(key)
    }

    fn upload_object(&self, key: &str, data: &[u8]) -> Result<()> {
        self.inner.upload_object(key, data)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }
}

#[test]
fn load_unknown_path_fails_with_not_in_manifest() {
    let device = open_device(&["*.mp4"]);
    let err = device.repo.load("/nowhere.mp4").unwrap_err();
    assert!(matches!(err, MnemoError::NotInManifest(_)));
}

#[test]
fn load_when_disabled_fails_with_not_in_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = lazy_config(dir.path(), &["*.mp4"]);
    config.lazy_load_enabled = false;
    let repo = Repository::open(config).unwrap();
    assert!(matches!(
        repo.load("/v.mp4"),
        Err(MnemoError::NotInManifest(_))
    ));
}

#[test]
fn load_restores_deleted_file_from_local_store() {
    let device = open_device(&["*.mp4"]);
    let content = vec![0xC3u8; 4096];
    device.write_data("media/v.mp4", &content);
    fsutil::set_file_mtime_ms(&device.data_path("media/v.mp4"), 1_600_000_000_000).unwrap();
    device.repo.snapshot("capture").unwrap();

    fs::remove_file(device.data_path("media/v.mp4")).unwrap();
    assert!(!device.repo.is_cached("/media/v.mp4"));

    device.repo.load("/media/v.mp4").unwrap();
    assert_eq!(device.read_data("media/v.mp4"), content);
    assert!(device.repo.is_cached("/media/v.mp4"));

    let lazy = device.repo.lazy().unwrap();
    let asset = lazy.manifest.get("/media/v.mp4").unwrap();
    assert_eq!(asset.status, LazyStatus::Cached);

    // The mtime is restored from the manifest record.
    let meta = fs::metadata(device.data_path("media/v.mp4")).unwrap();
    assert!((fsutil::mtime_ms(&meta) - asset.modified).abs() < 1_000);
}

#[test]
fn load_on_present_file_is_a_cheap_success() {
    let device = open_device(&["*.mp4"]);
    device.write_data("v.mp4", &[1u8; 128]);
    device.repo.snapshot("capture").unwrap();

    device.repo.load("v.mp4").unwrap();
    device.repo.load("/v.mp4").unwrap();
}

#[test]
fn load_falls_back_to_remote_and_caches_chunks() {
    let (_cloud_dir, cloud) = shared_cloud();
    let source = open_device_with_cloud(&["*.mp4"], cloud.clone());
    let content: Vec<u8> = (0..5120u32).map(|i| (i % 241) as u8).collect();
    source.write_data("large-files/v.mp4", &content);
    source.repo.snapshot("origin").unwrap();
    source.repo.push().unwrap();

    let mirror = open_device_with_cloud(&["*.mp4"], cloud);
    mirror.repo.pull().unwrap();
    assert!(!mirror.data_path("large-files/v.mp4").exists());

    mirror.repo.load("/large-files/v.mp4").unwrap();
    assert_eq!(mirror.read_data("large-files/v.mp4"), content);

    // Every chunk was cached into the local store on the way through.
    let lazy = mirror.repo.lazy().unwrap();
    let asset = lazy.manifest.get("/large-files/v.mp4").unwrap();
    for chunk_id in &asset.chunks {
        assert!(mirror.repo.store().has_chunk(chunk_id));
    }
}

#[test]
fn load_without_remote_fails_with_remote_unavailable() {
    let device = open_device(&["*.mp4"]);
    let lazy = device.repo.lazy().unwrap();
    lazy.manifest
        .put(LazyAsset {
            path: "/v.mp4".into(),
            file_id: FileId::compute(b"v"),
            size: 3,
            hash: String::new(),
            modified: 1,
            chunks: vec![mnemo_types::chunk_id::ChunkId::compute(b"xyz")],
            status: LazyStatus::Pending,
        })
        .unwrap();

    let err = device.repo.load("/v.mp4").unwrap_err();
    assert!(matches!(err, MnemoError::RemoteUnavailable(_)));
    assert_eq!(
        lazy.manifest.get("/v.mp4").unwrap().status,
        LazyStatus::Error
    );
}

#[test]
fn load_missing_remote_chunk_fails_with_chunk_missing() {
    let (_cloud_dir, cloud) = shared_cloud();
    let device = open_device_with_cloud(&["*.mp4"], cloud);
    let lazy = device.repo.lazy().unwrap();
    lazy.manifest
        .put(LazyAsset {
            path: "/v.mp4".into(),
            file_id: FileId::compute(b"v"),
            size: 3,
            hash: String::new(),
            modified: 1,
            chunks: vec![mnemo_types::chunk_id::ChunkId::compute(b"gone")],
            status: LazyStatus::Pending,
        })
        .unwrap();

    let err = device.repo.load("/v.mp4").unwrap_err();
    assert!(matches!(err, MnemoError::ChunkMissing(_)));
    assert!(!device.data_path("v.mp4").exists(), "no partial file");
}

#[test]
fn load_tolerates_manifest_spelling_without_separator() {
    let device = open_device(&["assets/**"]);
    device.write_data("assets/a.png", b"png bytes");
    device.repo.snapshot("capture").unwrap();
    fs::remove_file(device.data_path("assets/a.png")).unwrap();

    // Forge the legacy spelling: re-key the entry without the separator.
    let lazy = device.repo.lazy().unwrap();
    let mut asset = lazy.manifest.get("/assets/a.png").unwrap();
    lazy.manifest.delete("/assets/a.png").unwrap();
    asset.path = "assets/a.png".into();
    lazy.manifest.put(asset).unwrap();

    device.repo.load("/assets/a.png").unwrap();
    assert_eq!(device.read_data("assets/a.png"), b"png bytes");
}

#[test]
fn concurrent_loads_coalesce_to_one_fetch_stream() {
    let (_cloud_dir, inner) = shared_cloud();
    let source = open_device_with_cloud(&["*.mp4"], inner.clone());
    let content: Vec<u8> = (0..5120u32).map(|i| (i * 13 % 251) as u8).collect();
    source.write_data("large-files/v.mp4", &content);
    source.repo.snapshot("origin").unwrap();
    source.repo.push().unwrap();

    let mut mirror = open_device_with_cloud(&["*.mp4"], inner.clone());
    mirror.repo.pull().unwrap();

    let chunk_count = {
        let lazy = mirror.repo.lazy().unwrap();
        lazy.manifest.get("/large-files/v.mp4").unwrap().chunks.len()
    };
    assert!(chunk_count >= 1);

    // Count remote object reads from here on: only the loads below remain.
    let counting = Arc::new(CountingCloud::new(inner));
    mirror.repo.set_cloud(counting.clone());

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = &mirror.repo;
            handles.push(scope.spawn(move || repo.load("/large-files/v.mp4")));
        }
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    });

    assert_eq!(
        counting.chunk_downloads.load(Ordering::SeqCst),
        chunk_count,
        "ten concurrent loads must issue exactly one fetch per chunk"
    );
    assert_eq!(mirror.read_data("large-files/v.mp4"), content);
}

#[test]
fn clear_cache_removes_bytes_but_keeps_entries() {
    let device = open_device(&["*.mp4"]);
    device.write_data("v.mp4", &[6u8; 512]);
    device.repo.snapshot("capture").unwrap();

    assert_eq!(device.repo.clear_lazy_cache().unwrap(), 1);
    assert!(!device.data_path("v.mp4").exists());

    let (count, _) = device.repo.lazy_stats();
    assert_eq!(count, 1);
    let lazy = device.repo.lazy().unwrap();
    assert_eq!(
        lazy.manifest.get("/v.mp4").unwrap().status,
        LazyStatus::Pending
    );

    // The bytes come back on demand.
    device.repo.load("/v.mp4").unwrap();
    assert_eq!(device.read_data("v.mp4"), [6u8; 512]);
}
