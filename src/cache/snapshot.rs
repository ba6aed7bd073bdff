//! Persisted folder-size snapshots
//!
//! One JSON file per bucket, `<cache_dir>/<bucket>.json`, holding the
//! prefix→size map flattened next to a `time` field (float seconds since the
//! Unix epoch). Writes go through a temp file and rename so a crash never
//! leaves a truncated snapshot behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::CacheError;

/// Folder sizes as persisted at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds since the Unix epoch when the sizes were computed
    pub time: f64,
    /// Folder prefix → cumulative size in bytes
    #[serde(flatten)]
    pub entries: BTreeMap<String, u64>,
}

impl Snapshot {
    /// Timestamp as a SystemTime
    ///
    /// None when `time` is negative, not finite, or beyond what SystemTime
    /// can represent.
    pub fn taken_at(&self) -> Option<SystemTime> {
        Duration::try_from_secs_f64(self.time)
            .ok()
            .and_then(|d| UNIX_EPOCH.checked_add(d))
    }
}

/// Convert a SystemTime to the float seconds stored in snapshots
pub fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Reads and writes snapshots in a directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// Directory holding one file per bucket
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot file for a bucket
    pub fn path_for(&self, bucket: &str) -> PathBuf {
        self.dir.join(format!("{}.json", bucket))
    }

    /// Read the snapshot for a bucket
    ///
    /// Returns Ok(None) when no snapshot has been written yet.
    pub fn read(&self, bucket: &str) -> Result<Option<Snapshot>, CacheError> {
        let path = self.path_for(bucket);

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No folder-size snapshot on disk");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };

        let snapshot: Snapshot =
            serde_json::from_slice(&raw).map_err(|e| CacheError::Json { path: path.clone(), source: e })?;

        debug!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            time = snapshot.time,
            "Read folder-size snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Write the snapshot for a bucket, replacing any previous one atomically
    pub fn write(&self, bucket: &str, snapshot: &Snapshot) -> Result<(), CacheError> {
        let path = self.path_for(bucket);

        fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| CacheError::Json { path: path.clone(), source: e })?;

        let io_err = |e: std::io::Error| CacheError::Io {
            path: path.clone(),
            source: e,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            "Wrote folder-size snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut entries = BTreeMap::new();
        entries.insert("a/".to_string(), 300);
        entries.insert("a/b/".to_string(), 200);
        entries.insert("photos/2024 trip/".to_string(), 5_368_709_120);
        Snapshot {
            time: 1_709_287_200.125,
            entries,
        }
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.write("media", &sample()).unwrap();
        let read = store.read("media").unwrap().unwrap();

        assert_eq!(read, sample());
        assert_eq!(read.time, 1_709_287_200.125);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.read("media").unwrap().is_none());
    }

    #[test]
    fn test_file_named_after_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write("media", &sample()).unwrap();

        assert!(dir.path().join("media.json").exists());
        assert_eq!(store.path_for("media"), dir.path().join("media.json"));
    }

    #[test]
    fn test_file_format_is_flat_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write("media", &sample()).unwrap();

        let raw = std::fs::read_to_string(store.path_for("media")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["a/"], 300);
        assert_eq!(value["a/b/"], 200);
        assert!(value["time"].is_f64());
    }

    #[test]
    fn test_reads_snapshot_written_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(
            store.path_for("media"),
            r#"{"docs/": 4096, "docs/old/": 1024, "time": 1709287200.5}"#,
        )
        .unwrap();

        let snapshot = store.read("media").unwrap().unwrap();
        assert_eq!(snapshot.entries.get("docs/"), Some(&4096));
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.time, 1709287200.5);
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(store.path_for("media"), "{ not json").unwrap();

        assert!(matches!(store.read("media"), Err(CacheError::Json { .. })));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("s3browse");
        let store = SnapshotStore::new(&nested);

        store.write("media", &sample()).unwrap();
        assert!(nested.join("media.json").exists());
    }

    #[test]
    fn test_taken_at_round_trip() {
        let now = SystemTime::now();
        let snapshot = Snapshot {
            time: unix_seconds(now),
            entries: BTreeMap::new(),
        };
        let drift = match snapshot.taken_at().unwrap().duration_since(now) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(drift < Duration::from_millis(1));
    }

    #[test]
    fn test_taken_at_rejects_unrepresentable_times() {
        let at = |time: f64| {
            Snapshot {
                time,
                entries: BTreeMap::new(),
            }
            .taken_at()
        };

        assert_eq!(at(0.0), Some(UNIX_EPOCH));
        assert!(at(-1.0).is_none());
        assert!(at(f64::NAN).is_none());
        assert!(at(f64::INFINITY).is_none());
        assert!(at(1e19).is_none());
        assert!(at(1e20).is_none());
    }
}
