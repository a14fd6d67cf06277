//! Prompt/response cache with TTL expiry and oldest-entry eviction.
//!
//! Cache key is a SHA-256 digest of the normalized `(provider, prompt)`
//! pair. Entries expire after a configurable TTL and are deleted lazily on
//! read; when the store is full the entry with the oldest insertion time is
//! evicted. Access does not refresh an entry's age.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::debug;

/// A single cached response.
#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    created_at: u64,
}

/// Bounded in-memory response cache shared by all exchanges.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl_secs: u64,
    max_size: usize,
}

impl ResponseCache {
    /// Create a cache with the given TTL and capacity.
    ///
    /// `max_size` is clamped to a minimum of 1 so the eviction loop cannot
    /// spin forever.
    pub fn new(ttl_secs: u64, max_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_secs,
            max_size: max_size.max(1),
        }
    }

    /// Build a deterministic cache key from the normalized provider tag and
    /// prompt (lowercased, trimmed; empty provider maps to "default").
    ///
    /// Uses length-prefixed encoding so no `(provider, prompt)` pair can
    /// collide with another by shifting bytes across the boundary.
    fn cache_key(prompt: &str, provider: &str) -> String {
        let provider = provider.trim().to_lowercase();
        let provider = if provider.is_empty() {
            "default"
        } else {
            provider.as_str()
        };
        let prompt = prompt.trim().to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update((provider.len() as u64).to_le_bytes());
        hasher.update(provider.as_bytes());
        hasher.update((prompt.len() as u64).to_le_bytes());
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached response. Returns `None` if absent or expired;
    /// an expired entry is removed on the spot.
    pub fn get(&self, prompt: &str, provider: &str) -> Option<String> {
        let key = Self::cache_key(prompt, provider);
        let now = now_secs();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        match entries.get(&key) {
            Some(entry) if now.saturating_sub(entry.created_at) < self.ttl_secs => {
                debug!(key = %&key[..8], "cache hit");
                Some(entry.response.clone())
            }
            Some(_) => {
                debug!(key = %&key[..8], "cache entry expired, removing");
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store a response, evicting the oldest-inserted entry whenever the
    /// store is at capacity, then inserting unconditionally (overwrite
    /// semantics for an existing key).
    pub fn set(&self, prompt: &str, response: &str, provider: &str) {
        let key = Self::cache_key(prompt, provider);
        let now = now_secs();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        while entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!(key = %&k[..8], "evicting oldest cache entry");
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response: response.to_string(),
                created_at: now,
            },
        );
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(cache: &ResponseCache, prompt: &str, provider: &str, by_secs: u64) {
        let key = ResponseCache::cache_key(prompt, provider);
        let mut entries = cache.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            entry.created_at = entry.created_at.saturating_sub(by_secs);
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ResponseCache::new(300, 10);
        assert!(cache.get("how are you", "gemini").is_none());
        cache.set("how are you", "doing fine", "gemini");
        assert_eq!(cache.get("how are you", "gemini").as_deref(), Some("doing fine"));
    }

    #[test]
    fn test_key_is_provider_aware() {
        let cache = ResponseCache::new(300, 10);
        cache.set("hello", "from gemini", "gemini");
        assert!(cache.get("hello", "local").is_none());
        assert_eq!(cache.get("hello", "gemini").as_deref(), Some("from gemini"));
    }

    #[test]
    fn test_key_normalization() {
        let cache = ResponseCache::new(300, 10);
        cache.set("  Hello There ", "hi", "Gemini");
        assert_eq!(cache.get("hello there", "gemini").as_deref(), Some("hi"));
    }

    #[test]
    fn test_empty_provider_maps_to_default() {
        let cache = ResponseCache::new(300, 10);
        cache.set("hello", "hi", "");
        assert_eq!(cache.get("hello", "  ").as_deref(), Some("hi"));
    }

    #[test]
    fn test_ttl_expiry_deletes_on_read() {
        let cache = ResponseCache::new(300, 10);
        cache.set("old prompt", "old response", "gemini");
        backdate(&cache, "old prompt", "gemini", 301);
        assert!(cache.get("old prompt", "gemini").is_none());
        assert!(cache.is_empty(), "expired entry must be removed on read");
    }

    #[test]
    fn test_fresh_miss_occurs_exactly_once_after_expiry() {
        let cache = ResponseCache::new(300, 10);
        cache.set("p", "stale", "gemini");
        backdate(&cache, "p", "gemini", 301);
        assert!(cache.get("p", "gemini").is_none());
        cache.set("p", "fresh", "gemini");
        assert_eq!(cache.get("p", "gemini").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_eviction_removes_oldest_inserted() {
        let cache = ResponseCache::new(300, 3);
        cache.set("a", "1", "g");
        cache.set("b", "2", "g");
        cache.set("c", "3", "g");
        backdate(&cache, "a", "g", 100);
        backdate(&cache, "b", "g", 50);
        // Reading "a" does not refresh its age.
        assert!(cache.get("a", "g").is_some());
        cache.set("d", "4", "g");
        assert!(cache.get("a", "g").is_none(), "oldest-inserted entry evicted");
        assert!(cache.get("b", "g").is_some());
        assert!(cache.get("c", "g").is_some());
        assert!(cache.get("d", "g").is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_overwrite_existing_key() {
        let cache = ResponseCache::new(300, 10);
        cache.set("a", "1", "g");
        cache.set("a", "updated", "g");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a", "g").as_deref(), Some("updated"));
    }

    #[test]
    fn test_size_never_exceeds_max() {
        let cache = ResponseCache::new(300, 5);
        for i in 0..20 {
            cache.set(&format!("prompt {i}"), "r", "g");
            assert!(cache.len() <= 5);
        }
    }

    #[test]
    fn test_max_size_zero_clamped() {
        let cache = ResponseCache::new(300, 0);
        cache.set("a", "1", "g");
        assert_eq!(cache.len(), 1);
    }
}
