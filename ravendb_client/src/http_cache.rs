//! Per-executor cache of read responses.
//!
//! Entries are keyed by method, url and a hash of the request body, and hold the etag the
//! server returned together with the raw payload. Staleness is resolved through conditional
//! requests (`If-None-Match`), not by eviction timing; eviction only bounds memory.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::DashMap;
use reqwest::Method;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
    body_hash: [u8; 32],
}

impl CacheKey {
    pub fn new(method: &Method, url: &str, body: Option<&[u8]>) -> Self {
        let mut hasher = Sha256::new();
        if let Some(body) = body {
            hasher.update(body);
        }
        Self {
            method: method.clone(),
            url: url.to_string(),
            body_hash: hasher.finalize().into(),
        }
    }
}

/// An immutable cache entry. Refreshing an entry replaces it with a new one.
#[derive(Debug)]
pub struct CachedItem {
    change_vector: String,
    payload: Bytes,
    inserted_at: Instant,
}

impl CachedItem {
    pub fn change_vector(&self) -> &str {
        &self.change_vector
    }

    /// Cheap clone of the stored payload.
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

#[derive(Debug)]
pub struct HttpCache {
    entries: DashMap<CacheKey, Arc<CachedItem>>,
    max_entries: usize,
}

impl HttpCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedItem>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Stores a fresh response for `key`, replacing whatever was there.
    pub fn put(&self, key: CacheKey, change_vector: String, payload: Bytes) {
        if self.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Arc::new(CachedItem {
                change_vector,
                payload,
                inserted_at: Instant::now(),
            }),
        );
    }

    /// Marks the entry as confirmed by the server (a 304). Etag and payload are kept as they are.
    ///
    /// Returns the refreshed entry, or `None` if the key is no longer cached.
    pub fn refresh_age(&self, key: &CacheKey) -> Option<Arc<CachedItem>> {
        let mut entry = self.entries.get_mut(key)?;
        let refreshed = Arc::new(CachedItem {
            change_vector: entry.change_vector.clone(),
            payload: entry.payload.clone(),
            inserted_at: Instant::now(),
        });
        *entry = Arc::clone(&refreshed);
        Some(refreshed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::trace!(url = %key.url, "Evicting oldest http cache entry");
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use reqwest::Method;

    use super::{CacheKey, HttpCache};

    #[test]
    fn keys_differ_by_method_url_and_body() {
        let base = CacheKey::new(&Method::GET, "http://a/docs", None);

        assert_eq!(base, CacheKey::new(&Method::GET, "http://a/docs", None));
        assert_ne!(base, CacheKey::new(&Method::POST, "http://a/docs", None));
        assert_ne!(base, CacheKey::new(&Method::GET, "http://b/docs", None));
        assert_ne!(
            base,
            CacheKey::new(&Method::GET, "http://a/docs", Some(b"{\"q\":1}"))
        );
    }

    #[test]
    fn put_then_get_returns_etag_and_payload() {
        // Arrange
        let cache = HttpCache::new(16);
        let key = CacheKey::new(&Method::GET, "http://a/docs", None);

        // Act
        cache.put(key.clone(), "\"123\"".to_string(), Bytes::from_static(b"{}"));
        let item = cache.get(&key).unwrap();

        // Assert
        assert_eq!(item.change_vector(), "\"123\"");
        assert_eq!(item.payload(), Bytes::from_static(b"{}"));
    }

    #[test]
    fn refresh_age_keeps_etag_and_payload_but_resets_age() {
        // Arrange
        let cache = HttpCache::new(16);
        let key = CacheKey::new(&Method::GET, "http://a/docs", None);
        cache.put(key.clone(), "\"123\"".to_string(), Bytes::from_static(b"[1]"));
        std::thread::sleep(Duration::from_millis(20));
        let before = cache.get(&key).unwrap();

        // Act
        let refreshed = cache.refresh_age(&key).unwrap();

        // Assert
        assert_eq!(refreshed.change_vector(), before.change_vector());
        assert_eq!(refreshed.payload(), before.payload());
        assert!(refreshed.age() < before.age());
    }

    #[test]
    fn refresh_age_of_missing_key_returns_none() {
        let cache = HttpCache::new(16);

        let key = CacheKey::new(&Method::GET, "http://a/docs", None);

        assert!(cache.refresh_age(&key).is_none());
    }

    #[test]
    fn put_beyond_capacity_evicts_the_oldest_entry() {
        let cache = HttpCache::new(2);
        let first = CacheKey::new(&Method::GET, "http://a/1", None);
        let second = CacheKey::new(&Method::GET, "http://a/2", None);
        let third = CacheKey::new(&Method::GET, "http://a/3", None);

        cache.put(first.clone(), "1".to_string(), Bytes::new());
        std::thread::sleep(Duration::from_millis(2));
        cache.put(second.clone(), "2".to_string(), Bytes::new());
        std::thread::sleep(Duration::from_millis(2));
        cache.put(third.clone(), "3".to_string(), Bytes::new());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_some());
        assert!(cache.get(&third).is_some());
    }
}
