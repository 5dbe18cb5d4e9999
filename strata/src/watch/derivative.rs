//! Cache of values derived from resource content.
//!
//! Each entry remembers the resource it was computed from and watches it.
//! When the resource changes the entry expires and is removed; [`get`]
//! forces a synchronous refresh first, so a stale value is never returned
//! once the source's modification time has moved.
//!
//! [`get`]: DerivativeCache::get
//!
//! # Example
//!
//! ```ignore
//! let cache: DerivativeCache<String, Arc<Template>> = DerivativeCache::new();
//!
//! let template = match cache.get(&name) {
//!     Some(t) => t,
//!     None => {
//!         let t = Arc::new(Template::parse(&read_to_string(source.as_ref())?)?);
//!         cache.put(name.clone(), Arc::clone(&t), source);
//!         t
//!     }
//! };
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::resource::{Resource, ResourceRef};

use super::watcher::{ResourceWatcher, WatchOutcome, DEFAULT_POLL_INTERVAL};

struct CacheEntry<V> {
    value: V,
    watcher: ResourceWatcher,
    expired: Arc<AtomicBool>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        if self.expired.load(Ordering::Acquire) {
            return true;
        }
        self.watcher.refresh();
        self.expired.load(Ordering::Acquire)
    }
}

struct Inner<K, V> {
    entries: Mutex<HashMap<K, Arc<CacheEntry<V>>>>,
}

/// Map from keys to values derived from a source resource.
pub struct DerivativeCache<K, V> {
    inner: Arc<Inner<K, V>>,
    poll_interval: Duration,
}

impl<K, V> Default for DerivativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DerivativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache whose watchers poll at [`DEFAULT_POLL_INTERVAL`].
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Create an empty cache with a custom watcher poll interval.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
            }),
            poll_interval,
        }
    }

    /// Store `value`, derived from `source`, under `key`.
    ///
    /// The source's current modification time becomes the baseline, so the
    /// entry only expires on a later change. Replaces any existing entry.
    pub fn put(&self, key: K, value: V, source: ResourceRef) {
        let expired = Arc::new(AtomicBool::new(false));
        let handler = {
            let inner = Arc::downgrade(&self.inner);
            let key = key.clone();
            let expired = Arc::clone(&expired);
            move |resource: &dyn Resource| {
                expire(&inner, &key, &expired);
                tracing::debug!(uri = %resource.uri(), "Derived value expired");
                WatchOutcome::handled()
            }
        };

        let watcher = ResourceWatcher::new(source, handler).with_poll_interval(self.poll_interval);
        watcher.reset();

        let entry = Arc::new(CacheEntry {
            value,
            watcher,
            expired,
        });
        self.inner.entries.lock().insert(key, entry);
    }

    /// The value for `key`, unless missing or its source has changed.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.inner.entries.lock().get(key).cloned()?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    /// Check if `key` is missing or its source has changed.
    pub fn is_expired(&self, key: &K) -> bool {
        let entry = self.inner.entries.lock().get(key).cloned();
        entry.map_or(true, |e| e.is_expired())
    }

    /// Remove `key` without consulting its source.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let entry = self.inner.entries.lock().remove(key)?;
        entry.expired.store(true, Ordering::Release);
        Some(entry.value.clone())
    }

    /// Run a poll-respecting check on every entry, evicting changed ones.
    ///
    /// Returns the number of entries evicted.
    pub fn purge_expired(&self) -> usize {
        let snapshot: Vec<Arc<CacheEntry<V>>> =
            self.inner.entries.lock().values().cloned().collect();

        snapshot
            .iter()
            .filter(|entry| {
                entry.watcher.check();
                entry.expired.load(Ordering::Acquire)
            })
            .count()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

/// Mark an entry expired and drop it from the map if it is still the current one.
fn expire<K, V>(inner: &Weak<Inner<K, V>>, key: &K, expired: &Arc<AtomicBool>)
where
    K: Eq + Hash,
{
    expired.store(true, Ordering::Release);
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut entries = inner.entries.lock();
    if entries
        .get(key)
        .is_some_and(|entry| Arc::ptr_eq(&entry.expired, expired))
    {
        entries.remove(key);
    }
}

impl<K, V> fmt::Debug for DerivativeCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivativeCache")
            .field("entries", &self.inner.entries.lock().len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileResource;
    use filetime::FileTime;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn source(temp: &TempDir, name: &str) -> (PathBuf, ResourceRef) {
        let path = temp.path().join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        set_mtime(&path, 1_000_000);
        (path.clone(), Arc::new(FileResource::new(path).unwrap()))
    }

    fn set_mtime(path: &Path, secs: i64) {
        filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    fn cache() -> DerivativeCache<String, usize> {
        DerivativeCache::with_poll_interval(Duration::ZERO)
    }

    #[test]
    fn test_get_returns_fresh_value() {
        let temp = TempDir::new().unwrap();
        let (_, src) = source(&temp, "a.txt");
        let cache = cache();

        cache.put("a".to_string(), 42, src);

        assert_eq!(cache.get(&"a".to_string()), Some(42));
        assert_eq!(cache.get(&"a".to_string()), Some(42));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_after_source_change_is_none() {
        let temp = TempDir::new().unwrap();
        let (path, src) = source(&temp, "a.txt");
        let cache = cache();
        cache.put("a".to_string(), 42, src);

        fs::write(&path, b"changed").unwrap();
        set_mtime(&path, 2_000_000);

        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_again_after_expiry() {
        let temp = TempDir::new().unwrap();
        let (path, src) = source(&temp, "a.txt");
        let cache = cache();
        cache.put("a".to_string(), 1, Arc::clone(&src));

        set_mtime(&path, 2_000_000);
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.put("a".to_string(), 2, src);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn test_replaced_entry_not_evicted_by_old_watcher() {
        let temp = TempDir::new().unwrap();
        let (_, first) = source(&temp, "first.txt");
        let (second_path, second) = source(&temp, "second.txt");
        let cache = cache();

        cache.put("k".to_string(), 1, first);
        cache.put("k".to_string(), 2, second);
        assert_eq!(cache.get(&"k".to_string()), Some(2));

        set_mtime(&second_path, 2_000_000);
        assert!(cache.is_expired(&"k".to_string()));
    }

    #[test]
    fn test_invalidate() {
        let temp = TempDir::new().unwrap();
        let (_, src) = source(&temp, "a.txt");
        let cache = cache();
        cache.put("a".to_string(), 7, src);

        assert_eq!(cache.invalidate(&"a".to_string()), Some(7));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_expired(&"a".to_string()));
    }

    #[test]
    fn test_purge_expired_only_removes_changed() {
        let temp = TempDir::new().unwrap();
        let (a_path, a) = source(&temp, "a.txt");
        let (_, b) = source(&temp, "b.txt");
        let cache = cache();
        cache.put("a".to_string(), 1, a);
        cache.put("b".to_string(), 2, b);

        set_mtime(&a_path, 2_000_000);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn test_missing_key() {
        let cache = cache();
        assert_eq!(cache.get(&"nope".to_string()), None);
        assert!(cache.is_expired(&"nope".to_string()));
    }
}
