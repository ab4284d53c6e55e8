use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

/// Minimal key/value persistence. Values are opaque strings.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// One JSON file per key inside a cache directory.
pub struct FileKvStore {
    cache_dir: PathBuf,
    next_tmp: AtomicU64,
}

impl FileKvStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self {
            cache_dir,
            next_tmp: AtomicU64::new(0),
        })
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;
        Ok(Some(contents))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.cache_path(key);
        // Readers never see a partially written file, and concurrent
        // writers never share a temporary.
        let n = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), n));
        std::fs::write(&tmp, value).with_context(|| format!("Failed to write cache file: {}", key))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("Failed to replace cache file: {}", key))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub data: T,
    pub saved_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.saved_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Typed snapshot access on top of a [`KvStore`]. Clone shares the store.
#[derive(Clone)]
pub struct SnapshotStore {
    kv: Arc<dyn KvStore>,
    /// Highest version written per snapshot name.
    written: Arc<Mutex<HashMap<String, u64>>>,
}

impl SnapshotStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Read a snapshot. Missing and unreadable snapshots both yield `None`;
    /// the latter is logged.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<Snapshot<T>> {
        let raw = match self.kv.get(name) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(snapshot = name, error = %e, "Failed to read snapshot");
                return None;
            }
        };
        match serde_json::from_str::<Snapshot<T>>(&raw) {
            Ok(snapshot) => {
                debug!(snapshot = name, age = %snapshot.age_display(), "Snapshot loaded");
                Some(snapshot)
            }
            Err(e) => {
                warn!(snapshot = name, error = %e, "Failed to parse snapshot");
                None
            }
        }
    }

    /// Overwrite a snapshot. Returns `false` (and logs) on failure; never errors.
    pub fn write<T: Serialize>(&self, name: &str, data: &T) -> bool {
        let result = serde_json::to_string(&Snapshot::new(data))
            .context("Failed to serialize snapshot")
            .and_then(|contents| self.kv.put(name, &contents));
        match result {
            Ok(()) => {
                debug!(snapshot = name, "Snapshot written");
                true
            }
            Err(e) => {
                warn!(snapshot = name, error = %e, "Failed to write snapshot");
                false
            }
        }
    }

    /// Write `data` as version `version` of the snapshot unless a version at
    /// least as new has already been written. Writes to one store are
    /// serialized, so an older write finishing late cannot replace a newer one.
    pub fn write_versioned<T: Serialize>(&self, name: &str, version: u64, data: &T) -> bool {
        let mut written = self.written.lock();
        if written.get(name).is_some_and(|last| *last >= version) {
            debug!(snapshot = name, version = version, "Skipping stale snapshot write");
            return false;
        }
        let ok = self.write(name, data);
        if ok {
            written.insert(name.to_string(), version);
        }
        ok
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct BrokenKv;

    impl KvStore for BrokenKv {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("disk on fire"))
        }

        fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow::anyhow!("disk on fire"))
        }
    }

    #[test]
    fn test_snapshot_age_display_just_now() {
        let snapshot = Snapshot::new(vec![1, 2, 3]);
        assert_eq!(snapshot.age_display(), "just now");
    }

    #[test]
    fn test_snapshot_age_display_rounding() {
        let mut snapshot = Snapshot::new(());
        snapshot.saved_at = Utc::now() - Duration::minutes(95);
        assert_eq!(snapshot.age_display(), "2h ago");

        snapshot.saved_at = Utc::now() - Duration::minutes(5);
        assert_eq!(snapshot.age_display(), "5m ago");

        snapshot.saved_at = Utc::now() - Duration::hours(26);
        assert_eq!(snapshot.age_display(), "1d ago");
    }

    #[test]
    fn test_memory_store_write_then_read() {
        let store = SnapshotStore::in_memory();
        assert!(store.read::<Vec<i32>>("markers_2026").is_none());
        assert!(store.write("markers_2026", &vec![1, 2]));
        let snapshot = store.read::<Vec<i32>>("markers_2026").expect("snapshot");
        assert_eq!(snapshot.data, vec![1, 2]);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = SnapshotStore::new(Arc::new(FileKvStore::new(dir.path().to_path_buf()).expect("kv")));
        assert!(first.write("markers_2026", &"payload".to_string()));

        let second = SnapshotStore::new(Arc::new(FileKvStore::new(dir.path().to_path_buf()).expect("kv")));
        let snapshot = second.read::<String>("markers_2026").expect("snapshot");
        assert_eq!(snapshot.data, "payload");
        assert!(dir.path().join("markers_2026.json").exists());
    }

    #[test]
    fn test_older_version_never_replaces_newer() {
        let store = SnapshotStore::in_memory();
        assert!(store.write_versioned("markers_2026", 4, &"newer".to_string()));
        assert!(!store.write_versioned("markers_2026", 3, &"older".to_string()));
        assert!(!store.write_versioned("markers_2026", 4, &"same".to_string()));
        let snapshot = store.read::<String>("markers_2026").expect("snapshot");
        assert_eq!(snapshot.data, "newer");

        // Clones share the version record.
        let clone = store.clone();
        assert!(!clone.write_versioned("markers_2026", 2, &"older".to_string()));
        assert!(clone.write_versioned("markers_2026", 5, &"newest".to_string()));
        assert_eq!(store.read::<String>("markers_2026").expect("snapshot").data, "newest");
    }

    #[test]
    fn test_file_store_leaves_no_temporaries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(FileKvStore::new(dir.path().to_path_buf()).expect("kv"));
        let threads: Vec<_> = (0..8)
            .map(|n| {
                let kv = Arc::clone(&kv);
                std::thread::spawn(move || kv.put("markers_2026", &format!("\"v{}\"", n)))
            })
            .collect();
        for thread in threads {
            thread.join().expect("join").expect("put");
        }
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["markers_2026.json".to_string()]);
    }

    #[test]
    fn test_failures_are_swallowed() {
        let store = SnapshotStore::new(Arc::new(BrokenKv));
        assert!(!store.write("x", &1));
        assert!(store.read::<i32>("x").is_none());
    }

    #[test]
    fn test_corrupt_snapshot_reads_as_missing() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.put("x", "{not json").expect("put");
        let store = SnapshotStore::new(kv);
        assert!(store.read::<i32>("x").is_none());
    }
}
