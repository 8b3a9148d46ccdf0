/// Download-directory reaper.
///
/// Deletes files whose mtime is older than the TTL. Runs synchronously at
/// startup and after every download attempt; there is no background timer.
/// Per-file errors are ignored (the file may already be gone).
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::debug;

/// Sweep the direct children of `dir`, deleting every regular file older
/// than `ttl`. Returns the number of files deleted.
pub fn reap(dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    let now = SystemTime::now();
    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age > ttl && std::fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    if deleted > 0 {
        debug!("Reaped {} stale files from {}", deleted, dir.display());
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_files_younger_than_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fresh.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(reap(dir.path(), Duration::from_secs(3600)), 0);
        assert!(file.exists());
    }

    #[test]
    fn deletes_files_older_than_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stale.mp4");
        std::fs::write(&file, b"x").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(reap(dir.path(), Duration::ZERO), 1);
        assert!(!file.exists());
    }

    #[test]
    fn leaves_subdirectories_alone() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("inner.mp4"), b"x").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(reap(dir.path(), Duration::ZERO), 0);
        assert!(sub.join("inner.mp4").exists());
    }

    #[test]
    fn missing_directory_is_a_noop() {
        assert_eq!(reap(Path::new("/no/such/snag/dir"), Duration::ZERO), 0);
    }
}
