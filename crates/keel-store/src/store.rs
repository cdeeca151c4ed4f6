use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::snapshot::{self, SnapshotConfig};
use crate::traits::KeyValueStore;

/// Backing file of a persistent store.
#[derive(Debug)]
struct Backing {
    path: PathBuf,
    config: SnapshotConfig,
}

/// Concurrent typed key-value store with optional write-through snapshots.
///
/// The mapping lives in memory behind a single `RwLock`. When opened with a
/// backing path, every successful mutation re-serializes the entire mapping
/// to that file before returning. The write happens while the exclusive lock
/// is still held, so the file always matches the latest completed mutation.
///
/// This is O(n) per mutation in the number of entries. It suits small
/// control-plane datasets, not bulk data.
pub struct SnapshotStore<V> {
    entries: RwLock<HashMap<String, V>>,
    backing: Option<Backing>,
}

impl<V> SnapshotStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create an empty, purely in-memory store.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backing: None,
        }
    }

    /// Open a store backed by the snapshot file at `path`.
    ///
    /// If the file exists its contents become the initial mapping. If it does
    /// not exist the store starts empty and the file is created on the first
    /// mutation. A file that exists but cannot be decoded fails with
    /// [`StoreError::CorruptSnapshot`]; the store never starts empty over it.
    pub fn open(path: impl AsRef<Path>, config: SnapshotConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = snapshot::load::<V>(&path)?.unwrap_or_default();
        debug!(path = %path.display(), entries = entries.len(), "store opened");

        Ok(Self {
            entries: RwLock::new(entries),
            backing: Some(Backing { path, config }),
        })
    }

    /// Open a file-backed store if `path` is given, otherwise an in-memory one.
    pub fn open_optional(path: Option<&Path>, config: SnapshotConfig) -> StoreResult<Self> {
        match path {
            Some(path) => Self::open(path, config),
            None => Ok(Self::in_memory()),
        }
    }

    /// Path of the backing snapshot file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_ref().map(|b| b.path.as_path())
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// A cloned image of the whole mapping.
    pub fn entries(&self) -> HashMap<String, V> {
        self.read().clone()
    }

    /// Rewrite the snapshot file from the current mapping. No-op for
    /// in-memory stores.
    pub fn persist(&self) -> StoreResult<()> {
        let map = self.write();
        self.write_through(&map)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called with the write guard held.
    fn write_through(&self, map: &HashMap<String, V>) -> StoreResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };
        snapshot::save(&backing.path, map, &backing.config).inspect_err(|e| {
            warn!(path = %backing.path.display(), error = %e, "snapshot write failed");
        })
    }
}

impl<V> KeyValueStore<V> for SnapshotStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self, key: &str) -> Option<V> {
        self.read().get(key).cloned()
    }

    fn store(&self, key: String, value: V) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut map = self.write();
        map.insert(key, value);
        self.write_through(&map)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.write();
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_through(&map)?;
        Ok(true)
    }

    fn range(&self, visit: &mut dyn FnMut(&str, &V) -> bool) {
        // Visit a copy so callbacks may re-enter the store.
        let items: Vec<(String, V)> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in &items {
            if !visit(key, value) {
                break;
            }
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }
}

impl<V> Default for SnapshotStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<V> std::fmt::Debug for SnapshotStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("SnapshotStore")
            .field("entry_count", &count)
            .field("path", &self.backing.as_ref().map(|b| &b.path))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::snapshot::{SnapshotFormat, SyncMode};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i64,
    }

    fn p(x: i64) -> Point {
        Point { x }
    }

    fn temp_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("store.db")
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    #[test]
    fn store_load_delete_scenario() {
        let store = SnapshotStore::<Point>::in_memory();
        assert!(store.is_empty());

        store.store("a".into(), p(1)).unwrap();
        assert_eq!(store.load("a"), Some(p(1)));

        assert!(store.delete("a").unwrap());
        assert_eq!(store.load("a"), None);
    }

    #[test]
    fn load_missing_key_is_none() {
        let store = SnapshotStore::<Point>::in_memory();
        assert_eq!(store.load("missing"), None);
        assert!(!store.contains_key("missing"));
    }

    #[test]
    fn store_overwrites() {
        let store = SnapshotStore::<Point>::in_memory();
        store.store("k".into(), p(1)).unwrap();
        store.store("k".into(), p(2)).unwrap();
        assert_eq!(store.load("k"), Some(p(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = SnapshotStore::<Point>::in_memory();
        assert!(matches!(
            store.store(String::new(), p(1)),
            Err(StoreError::EmptyKey)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = SnapshotStore::<Point>::in_memory();
        store.store("k".into(), p(1)).unwrap();
        store.store("other".into(), p(2)).unwrap();

        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert_eq!(store.keys(), vec!["other".to_string()]);
    }

    #[test]
    fn keys_are_sorted() {
        let store = SnapshotStore::<Point>::in_memory();
        for key in ["c", "a", "b"] {
            store.store(key.into(), p(0)).unwrap();
        }
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn range_visits_each_entry_once() {
        let store = SnapshotStore::<Point>::in_memory();
        for i in 0..10 {
            store.store(format!("k{i}"), p(i)).unwrap();
        }
        let mut seen = HashMap::new();
        store.range(&mut |k, v| {
            assert!(seen.insert(k.to_string(), v.clone()).is_none());
            true
        });
        assert_eq!(seen, store.entries());
    }

    #[test]
    fn range_stops_early() {
        let store = SnapshotStore::<Point>::in_memory();
        for i in 0..10 {
            store.store(format!("k{i}"), p(i)).unwrap();
        }
        let mut visited = 0;
        store.range(&mut |_, _| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);
    }

    #[test]
    fn range_callback_may_mutate_store() {
        let store = SnapshotStore::<Point>::in_memory();
        store.store("a".into(), p(1)).unwrap();
        store.store("b".into(), p(2)).unwrap();
        store.range(&mut |k, v| {
            store.store(format!("{k}-copy"), v.clone()).unwrap();
            true
        });
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn values_default_method() {
        let store = SnapshotStore::<Point>::in_memory();
        store.store("a".into(), p(1)).unwrap();
        store.store("b".into(), p(2)).unwrap();
        let mut xs: Vec<i64> = store.values().into_iter().map(|v| v.x).collect();
        xs.sort();
        assert_eq!(xs, vec![1, 2]);
    }

    #[test]
    fn usable_as_trait_object() {
        let store: Arc<dyn KeyValueStore<Point>> = Arc::new(SnapshotStore::in_memory());
        store.store("a".into(), p(1)).unwrap();
        assert_eq!(store.load("a"), Some(p(1)));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn missing_file_starts_empty_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(!path.exists());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.db");
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        store.store("k".into(), p(1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn store_writes_through_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        store.store("a".into(), p(1)).unwrap();

        let on_disk = snapshot::load::<Point>(&path).unwrap().unwrap();
        assert_eq!(on_disk, store.entries());
    }

    #[test]
    fn reopen_restores_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        {
            let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
            store.store("a".into(), p(1)).unwrap();
            store.store("b".into(), p(2)).unwrap();
            store.store("a".into(), p(3)).unwrap();
            store.delete("b").unwrap();
            store.store("c".into(), p(4)).unwrap();
        }
        let reopened = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        let mut expected = HashMap::new();
        expected.insert("a".to_string(), p(3));
        expected.insert("c".to_string(), p(4));
        assert_eq!(reopened.entries(), expected);
    }

    #[test]
    fn delete_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        store.store("a".into(), p(1)).unwrap();
        store.delete("a").unwrap();
        drop(store);

        let reopened = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn deleting_absent_key_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        assert!(!store.delete("nothing").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_snapshot_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        fs::write(&path, b"garbage").unwrap();
        let err = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot { .. }), "{err}");
    }

    #[test]
    fn flipped_payload_byte_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        {
            let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
            store.store("a".into(), p(1)).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            SnapshotStore::<Point>::open(&path, SnapshotConfig::default()),
            Err(StoreError::CorruptSnapshot { .. })
        ));
    }

    #[test]
    fn bincode_snapshots_reopen_under_any_configured_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let bincode = SnapshotConfig {
            format: SnapshotFormat::Bincode,
            sync_mode: SyncMode::EveryWrite,
        };
        {
            let store = SnapshotStore::<Point>::open(&path, bincode).unwrap();
            store.store("a".into(), p(7)).unwrap();
        }
        let reopened = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        assert_eq!(reopened.load("a"), Some(p(7)));
    }

    #[test]
    fn persist_rewrites_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        store.persist().unwrap();
        assert!(path.exists());
        assert!(snapshot::load::<Point>(&path).unwrap().unwrap().is_empty());

        SnapshotStore::<Point>::in_memory().persist().unwrap();
    }

    #[test]
    fn failed_write_is_reported_and_memory_keeps_value() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let path = nested.join("store.db");
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();

        // Replace the parent directory with a regular file.
        fs::remove_dir_all(&nested).unwrap();
        fs::write(&nested, b"not a directory").unwrap();

        let err = store.store("a".into(), p(1)).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "{err}");
        assert_eq!(store.load("a"), Some(p(1)));
    }

    #[test]
    fn open_optional_without_path_is_in_memory() {
        let store = SnapshotStore::<Point>::open_optional(None, SnapshotConfig::default()).unwrap();
        assert!(store.path().is_none());
        store.store("a".into(), p(1)).unwrap();
        assert_eq!(store.load("a"), Some(p(1)));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn load_after_store_is_visible_from_other_threads() {
        let store = SnapshotStore::<Point>::in_memory();
        store.store("shared".into(), p(42)).unwrap();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(store.load("shared"), Some(p(42))));
            }
        });
    }

    fn hammer(store: &SnapshotStore<Point>, threads: i64, per_thread: i64) {
        thread::scope(|s| {
            for t in 0..threads {
                s.spawn(move || {
                    for i in 0..per_thread {
                        let key = format!("t{t}-k{i}");
                        store.store(key.clone(), p(i)).unwrap();
                        assert_eq!(store.load(&key), Some(p(i)));
                        store.store(key.clone(), p(i * 10)).unwrap();
                        if i % 3 == 0 {
                            assert!(store.delete(&key).unwrap());
                        }
                        store.range(&mut |_, _| true);
                    }
                });
            }
        });
    }

    fn expected_after_hammer(threads: i64, per_thread: i64) -> HashMap<String, Point> {
        let mut expected = HashMap::new();
        for t in 0..threads {
            for i in 0..per_thread {
                if i % 3 != 0 {
                    expected.insert(format!("t{t}-k{i}"), p(i * 10));
                }
            }
        }
        expected
    }

    #[test]
    fn concurrent_disjoint_writers_lose_nothing() {
        let store = SnapshotStore::<Point>::in_memory();
        hammer(&store, 8, 200);
        assert_eq!(store.entries(), expected_after_hammer(8, 200));
    }

    #[test]
    fn concurrent_writers_leave_consistent_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        hammer(&store, 4, 25);

        let expected = expected_after_hammer(4, 25);
        assert_eq!(store.entries(), expected);
        drop(store);
        let reopened = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
        assert_eq!(reopened.entries(), expected);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Store(String, i64),
        Delete(String),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            ("[a-d]{1,2}", any::<i64>()).prop_map(|(k, x)| Op::Store(k, x)),
            "[a-d]{1,2}".prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn reopened_store_matches_model(ops in proptest::collection::vec(op(), 0..24)) {
            let dir = tempfile::tempdir().unwrap();
            let path = temp_path(&dir);
            let mut model = HashMap::new();
            {
                let store = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
                for op in &ops {
                    match op {
                        Op::Store(k, x) => {
                            store.store(k.clone(), p(*x)).unwrap();
                            model.insert(k.clone(), p(*x));
                        }
                        Op::Delete(k) => {
                            let existed = store.delete(k).unwrap();
                            prop_assert_eq!(existed, model.remove(k).is_some());
                        }
                    }
                }
                prop_assert_eq!(store.entries(), model.clone());
            }
            let reopened = SnapshotStore::<Point>::open(&path, SnapshotConfig::default()).unwrap();
            prop_assert_eq!(reopened.entries(), model);
        }
    }
}
