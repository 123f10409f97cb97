use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::CacheStats;
use crate::provider::{normalize_text, stable_hash};

/// Content-addressed in-memory embedding cache
///
/// Keys are the stable hash of the normalized source text, so identical
/// text never regenerates a vector twice within a process lifetime. The
/// cache is a pure optimization layer: it holds no authority over
/// persisted vectors and may be cleared at any time. Producers are
/// idempotent, so last-writer-wins per key is sufficient.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<u32, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(text: &str) -> u32 {
        stable_hash(&normalize_text(text))
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries
            .read()
            .expect("embedding cache lock poisoned")
            .get(&Self::key(text))
            .cloned()
    }

    pub fn put(&self, text: &str, vector: Vec<f32>) {
        self.entries
            .write()
            .expect("embedding cache lock poisoned")
            .insert(Self::key(text), vector);
    }

    /// Drop every entry; only affects future lookups, never persisted state
    pub fn clear(&self) {
        self.entries
            .write()
            .expect("embedding cache lock poisoned")
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("embedding cache lock poisoned");
        let approx_bytes = entries
            .values()
            .map(|v| v.len() * std::mem::size_of::<f32>() + std::mem::size_of::<u32>())
            .sum();
        CacheStats {
            count: entries.len(),
            approx_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let cache = EmbeddingCache::new();
        assert!(cache.get("camden burglary").is_none());

        cache.put("camden burglary", vec![0.1, 0.2]);
        assert_eq!(cache.get("camden burglary"), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn test_keys_are_normalized() {
        let cache = EmbeddingCache::new();
        cache.put("Camden Burglary", vec![1.0]);
        assert_eq!(cache.get("  camden burglary "), Some(vec![1.0]));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = EmbeddingCache::new();
        cache.put("theft", vec![1.0]);
        cache.put("theft", vec![2.0]);
        assert_eq!(cache.get("theft"), Some(vec![2.0]));
        assert_eq!(cache.stats().count, 1);
    }

    #[test]
    fn test_clear_empties_future_lookups() {
        let cache = EmbeddingCache::new();
        cache.put("theft", vec![1.0]);
        cache.put("arson", vec![2.0]);
        cache.clear();
        assert!(cache.get("theft").is_none());
        assert!(cache.get("arson").is_none());
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_stats_accounts_for_vectors() {
        let cache = EmbeddingCache::new();
        cache.put("theft", vec![0.0; 384]);
        let stats = cache.stats();
        assert_eq!(stats.count, 1);
        assert!(stats.approx_bytes >= 384 * 4);
    }
}
