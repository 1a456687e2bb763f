use std::fs::{self, FileTimes, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use rand::RngCore;

/// Write `data` to `path` crash-safely: temp file in the same directory,
/// fsync, then rename over the target. Parent directories are created.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut suffix = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut suffix);
    let tmp = parent.join(format!(".mnemo-tmp-{}", hex::encode(suffix)));

    let write = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()
    })();
    if let Err(e) = write {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Set a file's modification time from a millisecond Unix epoch.
pub(crate) fn set_file_mtime_ms(path: &Path, mtime_ms: i64) -> std::io::Result<()> {
    let time = if mtime_ms >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_millis(mtime_ms as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_millis(mtime_ms.unsigned_abs())
    };
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_times(FileTimes::new().set_modified(time))
}

/// Modification time of existing metadata as a millisecond Unix epoch.
/// Pre-epoch times clamp to their (negative) millisecond value.
pub(crate) fn mtime_ms(meta: &fs::Metadata) -> i64 {
    match meta.modified() {
        Ok(time) => match time.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.bin");
        write_atomic(&target, b"payload").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn write_atomic_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");
        write_atomic(&target, b"data").unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["f".to_string()]);
    }

    #[test]
    fn mtime_roundtrips_within_a_second() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("stamped");
        fs::write(&target, b"x").unwrap();

        let want: i64 = 1_700_000_000_123;
        set_file_mtime_ms(&target, want).unwrap();
        let got = mtime_ms(&fs::metadata(&target).unwrap());
        assert!((got - want).abs() < 1_000, "mtime off by {}ms", got - want);
    }
}
