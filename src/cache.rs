//! In-memory response cache with stale-while-revalidate reads.
//!
//! Entries live for the lifetime of the client. Expired entries are removed
//! by the lookup that discovers them; nothing sweeps in the background and
//! there is no capacity bound.

use crate::body::Payload;
use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Per-call caching options.
///
/// ```
/// use ricochet::CachePolicy;
/// use std::time::Duration;
///
/// let policy = CachePolicy::for_duration(Duration::from_secs(5))
///     .on_stale(|cached| println!("showing cached value first: {cached:?}"));
/// # let _ = policy;
/// ```
#[derive(Clone, Default)]
pub struct CachePolicy {
    /// How long an entry may be served. `None` means forever.
    pub cache_time: Option<Duration>,
    /// Called with the cached value before the fresh attempt starts.
    pub on_stale: Option<Arc<dyn Fn(&Payload) + Send + Sync>>,
}

impl CachePolicy {
    /// Caches results without expiry.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Caches results for `cache_time`.
    pub fn for_duration(cache_time: Duration) -> Self {
        Self {
            cache_time: Some(cache_time),
            on_stale: None,
        }
    }

    /// Sets the stale-value callback.
    pub fn on_stale(mut self, callback: impl Fn(&Payload) + Send + Sync + 'static) -> Self {
        self.on_stale = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("cache_time", &self.cache_time)
            .field("on_stale", &self.on_stale.is_some())
            .finish()
    }
}

/// The cache key for a call: `METHOD:url`.
pub fn cache_key(method: &Method, url: &Url) -> String {
    format!("{method}:{url}")
}

#[derive(Debug)]
struct CacheEntry {
    value: Payload,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, cache_time: Option<Duration>) -> bool {
        cache_time.map_or(true, |ttl| self.stored_at.elapsed() < ttl)
    }
}

/// A keyed store of the last successful result per call identity.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value if it is younger than `cache_time`.
    ///
    /// An expired entry is deleted and `None` is returned.
    pub fn lookup(&self, key: &str, cache_time: Option<Duration>) -> Option<Payload> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        if entry.is_fresh(cache_time) {
            tracing::debug!(key, "Cache hit");
            return Some(entry.value.clone());
        }
        entries.remove(key);
        tracing::debug!(key, "Cache entry expired; evicted");
        None
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn store(&self, key: impl Into<String>, value: Payload) {
        self.lock().insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Deletes the entry under `key` if it is older than `cache_time`.
    ///
    /// Returns `true` if an entry was deleted.
    pub fn invalidate_if_expired(&self, key: &str, cache_time: Option<Duration>) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_fresh(cache_time) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes the entry under `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Payload> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// The number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_includes_method_and_url() {
        let url = Url::parse("https://api.test/a?b=1").unwrap();
        assert_eq!(cache_key(&Method::GET, &url), "GET:https://api.test/a?b=1");
        assert_ne!(cache_key(&Method::GET, &url), cache_key(&Method::POST, &url));
    }

    #[tokio::test(start_paused = true)]
    async fn reads_within_ttl_are_stable() {
        let cache = ResponseCache::new();
        let ttl = Some(Duration::from_secs(5));
        cache.store("GET:/a", Payload::Json(json!({"data": "a"})));

        let first = cache.lookup("GET:/a", ttl);
        tokio::time::advance(Duration::from_secs(4)).await;
        let second = cache.lookup("GET:/a", ttl);
        assert_eq!(first, second);
        assert_eq!(first, Some(Payload::Json(json!({"data": "a"}))));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_reads_evict() {
        let cache = ResponseCache::new();
        let ttl = Some(Duration::from_secs(5));
        cache.store("GET:/a", Payload::Text("a".into()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.lookup("GET:/a", ttl), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_entries_never_expire() {
        let cache = ResponseCache::new();
        cache.store("GET:/a", Payload::Null);
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(cache.lookup("GET:/a", None), Some(Payload::Null));
        assert!(!cache.invalidate_if_expired("GET:/a", None));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_if_expired_only_drops_old_entries() {
        let cache = ResponseCache::new();
        let ttl = Some(Duration::from_millis(100));
        cache.store("k", Payload::Null);
        assert!(!cache.invalidate_if_expired("k", ttl));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(cache.invalidate_if_expired("k", ttl));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.remove("k"), None);
    }
}
