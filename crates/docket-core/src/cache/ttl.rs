use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Lifetime of an entry stored without an explicit TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the background sweeper drops expired entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Floor for any sweep interval; `tokio::time::interval` rejects zero
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TtlEntry<V> {
    pub data: V,
    pub expires_at: Instant,
}

impl<V> TtlEntry<V> {
    fn new(data: V, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    /// Expired but not yet swept
    pub expired: usize,
    pub valid: usize,
}

/// String-keyed cache with per-entry expiry.
///
/// Independent of the query cache: no subscribers, no fetching. Expired
/// entries are dropped lazily by `get`/`has` and in bulk by `clear_expired`.
/// Clones share the same entries.
pub struct TtlCache<V> {
    entries: Arc<Mutex<HashMap<String, TtlEntry<V>>>>,
    default_ttl: Duration,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            default_ttl: self.default_ttl,
        }
    }
}

impl<V: Clone + Send + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, TtlEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, key: impl Into<String>, data: V) {
        self.set_with_ttl(key, data, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, data: V, ttl: Duration) {
        self.entries().insert(key.into(), TtlEntry::new(data, ttl));
    }

    /// Insert a batch under one lock. Items without a TTL get the default.
    pub fn set_many<K, I>(&self, items: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V, Option<Duration>)>,
    {
        let mut entries = self.entries();
        for (key, data, ttl) in items {
            let ttl = ttl.unwrap_or(self.default_ttl);
            entries.insert(key.into(), TtlEntry::new(data, ttl));
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
            None => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    pub fn remove_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> usize {
        let mut entries = self.entries();
        keys.into_iter()
            .filter(|key| entries.remove(*key).is_some())
            .count()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Entry counts by a full scan; nothing is evicted.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        let expired = entries.values().filter(|entry| entry.is_expired(now)).count();
        CacheStats {
            total: entries.len(),
            expired,
            valid: entries.len() - expired,
        }
    }

    /// Entry count including expired-but-unswept entries
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Run `clear_expired` every `interval` until every clone of this cache
    /// is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = weak.upgrade() else {
                    break;
                };
                let now = Instant::now();
                let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired(now));
                let removed = before - entries.len();
                if removed > 0 {
                    debug!(removed, "TTL cache sweep");
                }
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
