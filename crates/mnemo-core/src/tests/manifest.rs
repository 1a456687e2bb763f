use std::fs;

use mnemo_types::chunk_id::ChunkId;
use mnemo_types::file_id::FileId;

use crate::error::MnemoError;
use crate::lazy::manifest::{
    LazyAsset, LazyStatus, ManifestStore, MANIFEST_RELATIVE_PATH,
};
use crate::snapshot::file::FileRecord;

fn asset(path: &str, modified: i64, chunks: &[&[u8]]) -> LazyAsset {
    let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| ChunkId::compute(c)).collect();
    let size = chunks.iter().map(|c| c.len() as u64).sum();
    LazyAsset {
        path: path.to_string(),
        file_id: FileId::compute(path.as_bytes()),
        size,
        hash: String::new(),
        modified,
        chunks: chunk_ids,
        status: LazyStatus::Pending,
    }
}

fn record(path: &str, size: u64, updated: i64, chunks: &[&[u8]]) -> FileRecord {
    let chunk_ids: Vec<ChunkId> = chunks.iter().map(|c| ChunkId::compute(c)).collect();
    FileRecord::new(path.to_string(), size, updated, chunk_ids)
}

#[test]
fn missing_file_yields_empty_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    assert_eq!(store.stats(), (0, 0));
}

#[test]
fn save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("/media/clip.mov", 1_000, &[b"c1", b"c2"])).unwrap();
    store.put(asset("/media/song.flac", 2_000, &[b"c3"])).unwrap();

    let reloaded = ManifestStore::load(dir.path()).unwrap();
    assert_eq!(reloaded.assets(), store.assets());
    assert_eq!(reloaded.stats(), (2, 6));
}

#[test]
fn corrupt_json_surfaces_as_manifest_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(MANIFEST_RELATIVE_PATH);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"{ not json").unwrap();

    assert!(matches!(
        ManifestStore::load(dir.path()),
        Err(MnemoError::ManifestCorrupt(_))
    ));
}

#[test]
fn get_tolerates_both_spellings() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("assets/a.png", 10, &[b"x"])).unwrap();

    assert!(store.get("assets/a.png").is_some());
    assert!(store.get("/assets/a.png").is_some());

    store.put(asset("/assets/b.png", 10, &[b"y"])).unwrap();
    assert!(store.get("assets/b.png").is_some());
    assert!(store.get("/assets/b.png").is_some());
}

#[test]
fn put_collapses_alternate_spelling() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("assets/a.png", 10, &[b"old"])).unwrap();
    store.put(asset("/assets/a.png", 20, &[b"new"])).unwrap();

    let (count, _) = store.stats();
    assert_eq!(count, 1);
    assert_eq!(store.get("assets/a.png").unwrap().modified, 20);
}

#[test]
fn load_canonicalizes_duplicate_spellings_keeping_newest() {
    let dir = tempfile::tempdir().unwrap();
    {
        // Forge a legacy manifest holding the same logical path twice.
        let older = asset("media/v.mp4", 100, &[b"old"]);
        let newer = asset("/media/v.mp4", 200, &[b"new"]);
        let json = serde_json::json!({
            "version": "1.0",
            "assets": { "media/v.mp4": older, "/media/v.mp4": newer },
            "updated": 0
        });
        let path = dir.path().join(MANIFEST_RELATIVE_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
    }

    let store = ManifestStore::load(dir.path()).unwrap();
    let (count, _) = store.stats();
    assert_eq!(count, 1);
    assert_eq!(store.get("/media/v.mp4").unwrap().modified, 200);
}

#[test]
fn load_rewrites_lone_legacy_keys_to_canonical_spelling() {
    let dir = tempfile::tempdir().unwrap();
    {
        // A legacy manifest whose only entry lacks the leading separator.
        let lone = asset("media/v.mp4", 100, &[b"c"]);
        let json = serde_json::json!({
            "version": "1.0",
            "assets": { "media/v.mp4": lone },
            "updated": 0
        });
        let path = dir.path().join(MANIFEST_RELATIVE_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
    }

    let store = ManifestStore::load(dir.path()).unwrap();
    let entry = store.get("media/v.mp4").unwrap();
    assert_eq!(entry.path, "/media/v.mp4");

    // The next save persists the canonical key, never the legacy spelling.
    store.set_status("/media/v.mp4", LazyStatus::Cached).unwrap();
    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join(MANIFEST_RELATIVE_PATH)).unwrap())
            .unwrap();
    assert!(raw["assets"].get("/media/v.mp4").is_some());
    assert!(raw["assets"].get("media/v.mp4").is_none());
}

#[test]
fn unknown_status_reads_as_pending() {
    let dir = tempfile::tempdir().unwrap();
    let mut forged = asset("/a.bin", 1, &[b"c"]);
    forged.status = LazyStatus::Cached;
    let mut value = serde_json::to_value(&forged).unwrap();
    value["status"] = serde_json::json!(9);
    let json = serde_json::json!({
        "version": "1.0",
        "assets": { "/a.bin": value },
        "updated": 0
    });
    let path = dir.path().join(MANIFEST_RELATIVE_PATH);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

    let store = ManifestStore::load(dir.path()).unwrap();
    assert_eq!(store.get("/a.bin").unwrap().status, LazyStatus::Pending);
}

#[test]
fn delete_removes_either_spelling() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("assets/a.png", 10, &[b"x"])).unwrap();

    assert!(store.delete("/assets/a.png").unwrap());
    assert!(!store.delete("/assets/a.png").unwrap());
    assert_eq!(store.stats(), (0, 0));
}

#[test]
fn merge_counts_new_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();

    let observed = vec![record("/v.mp4", 3, 100, &[b"abc"])];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.new, 1);
    assert_eq!(stats.conflicted, 0);
    assert_eq!(store.get("/v.mp4").unwrap().status, LazyStatus::Pending);
}

#[test]
fn merge_newer_observation_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("/v.mp4", 100, &[b"old"])).unwrap();

    let observed = vec![record("/v.mp4", 3, 200, &[b"new"])];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.conflicted, 1);
    assert_eq!(stats.merged, 1);

    let merged = store.get("/v.mp4").unwrap();
    assert_eq!(merged.modified, 200);
    assert_eq!(merged.chunks, vec![ChunkId::compute(b"new")]);
}

#[test]
fn merge_older_observation_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("/v.mp4", 300, &[b"current"])).unwrap();

    let observed = vec![record("/v.mp4", 3, 100, &[b"stale"])];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.conflicted, 1);
    assert_eq!(stats.merged, 0);
    assert_eq!(store.get("/v.mp4").unwrap().modified, 300);
}

#[test]
fn merge_tie_with_different_chunks_adopts_observation() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    store.put(asset("/v.mp4", 100, &[b"one"])).unwrap();

    let observed = vec![record("/v.mp4", 5, 100, &[b"other"])];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.conflicted, 1);
    assert_eq!(stats.merged, 1);
    assert_eq!(store.get("/v.mp4").unwrap().chunks, vec![ChunkId::compute(b"other")]);
}

#[test]
fn merge_identical_observation_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    let existing = asset("/v.mp4", 100, &[b"same"]);
    store.put(existing.clone()).unwrap();

    let observed = vec![FileRecord {
        id: existing.file_id,
        path: existing.path.clone(),
        size: existing.size,
        updated: existing.modified,
        chunks: existing.chunks.clone(),
    }];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.conflicted, 0);
    assert_eq!(stats.merged, 0);
    assert_eq!(stats.new, 0);
}

#[test]
fn merge_skips_chunkless_observation_with_size() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();

    let observed = vec![record("/broken.bin", 42, 100, &[])];
    let stats = store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(stats.new, 0);
    assert!(store.get("/broken.bin").is_none());
}

#[test]
fn merge_derives_cached_status_from_disk_presence() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    fs::create_dir_all(dir.path().join("media")).unwrap();
    fs::write(dir.path().join("media/here.bin"), b"abc").unwrap();

    let observed = vec![
        record("/media/here.bin", 3, 100, &[b"abc"]),
        record("/media/absent.bin", 3, 100, &[b"xyz"]),
    ];
    store.merge_observed(&observed, dir.path()).unwrap();
    assert_eq!(store.get("/media/here.bin").unwrap().status, LazyStatus::Cached);
    assert_eq!(store.get("/media/absent.bin").unwrap().status, LazyStatus::Pending);
}

#[test]
fn high_water_mark_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::load(dir.path()).unwrap();
    assert!(store.last_synced().is_none());

    let id = "ab".repeat(20).parse().unwrap();
    store.set_last_synced(id).unwrap();

    let reloaded = ManifestStore::load(dir.path()).unwrap();
    assert_eq!(reloaded.last_synced(), Some(id));
}
