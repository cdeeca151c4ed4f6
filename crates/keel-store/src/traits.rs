use crate::error::StoreResult;

/// Typed key-value store shared by concurrent readers and writers.
///
/// A store is monomorphic: one value type `V` per instance. Keys are
/// non-empty strings, unique within the store.
///
/// All implementations must satisfy these invariants:
/// - The store itself is the synchronization boundary; callers never lock.
/// - Per key, operations are linearizable: a `load` that starts after a
///   `store` returned observes that value, from any thread.
/// - `range` never visits an entry twice and is not required to observe
///   entries added after it starts.
/// - Persistence errors are returned to the caller, never silently dropped.
pub trait KeyValueStore<V>: Send + Sync {
    /// Current value for `key`, or `None` if absent.
    fn load(&self, key: &str) -> Option<V>;

    /// Insert or overwrite the value for `key`.
    ///
    /// For persistent stores the durable image reflects this write before the
    /// call returns. Returns `Err` on an empty key or a failed write-through.
    fn store(&self, key: String, value: V) -> StoreResult<()>;

    /// Remove `key`. Returns `true` if an entry existed.
    ///
    /// Deleting an absent key is a no-op and not an error.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Call `visit` for every entry in unspecified order, stopping early when
    /// it returns `false`.
    fn range(&self, visit: &mut dyn FnMut(&str, &V) -> bool);

    /// Whether `key` currently has a value.
    fn contains_key(&self, key: &str) -> bool {
        self.load(key).is_some()
    }

    /// Collect every value. Default implementation goes through `range()`.
    fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut out = Vec::new();
        self.range(&mut |_, value| {
            out.push(value.clone());
            true
        });
        out
    }
}
