//! Embedding cache for efficient retrieval.
//!
//! Keys are normalized query text (trimmed, lower-cased); values are unit
//! vectors. The cache is a bounded LRU: a hit promotes the entry and an
//! insert past capacity evicts the least recently used one.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};
use crate::similarity::normalize;

/// Default maximum number of cached query embeddings.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Normalize query text into a cache key.
pub fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Cache for query embeddings to avoid redundant provider calls.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Embedding>>,
    max_entries: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a new in-memory cache holding at most `max_entries` vectors.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(max_entries)),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get an embedding from the cache, marking it most recently used.
    pub async fn get(&self, text: &str) -> Option<Embedding> {
        let key = cache_key(text);
        let found = self.entries.lock().await.get(&key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Embedding cache hit for {key:?}");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or overwrite an embedding, evicting the least recently used
    /// entry when the cache is full.
    pub async fn put(&self, text: &str, embedding: Embedding) {
        let key = cache_key(text);
        let mut entries = self.entries.lock().await;
        match entries.push(key.clone(), embedding) {
            Some((evicted, _)) if evicted != key => {
                debug!("Evicted {evicted:?} from embedding cache");
            }
            _ => {}
        }
    }

    /// Lookup by an already normalized key that leaves the hit and miss
    /// counters alone.
    async fn get_uncounted(&self, key: &str) -> Option<Embedding> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Check if an embedding is cached without touching its recency.
    pub async fn contains(&self, text: &str) -> bool {
        self.entries.lock().await.contains(&cache_key(text))
    }

    /// Number of cached embeddings.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            max_entries: self.max_entries.get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups that found a vector.
    pub hits: u64,

    /// Lookups that did not.
    pub misses: u64,
}

type Gate = Arc<Mutex<()>>;

/// A wrapper that provides cached, normalized embedding generation.
///
/// Concurrent misses for the same key share one provider call: the first
/// caller holds a per-key gate while it embeds, later callers wait on the
/// gate and then read the cache.
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
    inflight: Arc<std::sync::Mutex<HashMap<String, Gate>>>,
    dimension: Option<usize>,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self {
            provider,
            cache,
            inflight: Arc::new(std::sync::Mutex::new(HashMap::new())),
            dimension: None,
        }
    }

    /// Reject provider vectors whose length is not `dimension`; they are
    /// never cached.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Return the unit embedding for `text`, calling the provider only on a
    /// cache miss.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let key = cache_key(text);

        if let Some(embedding) = self.cache.get(&key).await {
            return Ok(embedding);
        }

        let gate = self.gate_for(&key);
        let _release = InflightRelease {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
        };
        let _held = gate.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(embedding) = self.cache.get_uncounted(&key).await {
            return Ok(embedding);
        }

        debug!("Embedding cache miss for {key:?}, calling {}", self.provider.name());
        let response = self.provider.embed(EmbeddingRequest::new(key.clone())).await?;
        let embedding = normalize(response.embedding)?;
        if let Some(expected) = self.dimension {
            if embedding.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        self.cache.put(&key, embedding.clone()).await;

        Ok(embedding)
    }

    fn gate_for(&self, key: &str) -> Gate {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(inflight.entry(key.to_string()).or_default())
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Get the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// Drops the in-flight gate for a key once no other caller holds it,
/// including when the owning future is cancelled.
struct InflightRelease {
    inflight: Arc<std::sync::Mutex<HashMap<String, Gate>>>,
    key: String,
}

impl Drop for InflightRelease {
    fn drop(&mut self) {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // One reference lives in the map, one in the dropping caller.
        if inflight
            .get(&self.key)
            .is_some_and(|gate| Arc::strong_count(gate) <= 2)
        {
            inflight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::provider::EmbeddingResponse;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![0.6, 0.8];

        cache.put("Bar Soap", embedding.clone()).await;

        assert_eq!(cache.get("bar soap").await, Some(embedding.clone()));
        assert_eq!(cache.get("  BAR SOAP ").await, Some(embedding));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = EmbeddingCache::new(100);
        assert!(cache.get("not cached").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_never_exceeds_capacity() {
        let cache = EmbeddingCache::new(3);
        for i in 0..20 {
            cache.put(&format!("query {i}"), vec![i as f32]).await;
            assert!(cache.len().await <= 3);
        }
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", vec![1.0]).await;
        cache.put("b", vec![2.0]).await;
        cache.put("c", vec![3.0]).await;

        assert!(!cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(cache.contains("c").await);
    }

    #[tokio::test]
    async fn test_cache_get_prevents_eviction() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", vec![1.0]).await;
        cache.put("b", vec![2.0]).await;
        assert!(cache.get("a").await.is_some());
        cache.put("c", vec![3.0]).await;

        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
    }

    #[tokio::test]
    async fn test_cache_overwrite_keeps_size() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", vec![1.0]).await;
        cache.put("A ", vec![2.0]).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("a").await, Some(vec![2.0]));
    }

    #[tokio::test]
    async fn test_zero_capacity_holds_one() {
        let cache = EmbeddingCache::new(0);
        cache.put("a", vec![1.0]).await;
        cache.put("b", vec![2.0]).await;
        assert_eq!(cache.stats().await.max_entries, 1);
        assert_eq!(cache.len().await, 1);
    }

    struct CountingProvider {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "test"
        }

        async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(EmbeddingError::Provider("down".to_string()));
            }
            Ok(EmbeddingResponse {
                embedding: vec![3.0, 4.0, 0.0],
                model: "test".to_string(),
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_cached_provider_normalizes_and_caches() {
        let cached = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(10));

        let first = cached.embed("Night Cream").await.unwrap();
        let second = cached.embed("night cream ").await.unwrap();

        assert_eq!(first, second);
        assert!((first[0] - 0.6).abs() < 1e-6);
        assert!((first[1] - 0.8).abs() < 1e-6);
        assert_eq!(cached.provider().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_call() {
        let cached = Arc::new(CachedProvider::new(
            CountingProvider::new(),
            EmbeddingCache::new(10),
        ));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let cached = Arc::clone(&cached);
            handles.push(tokio::spawn(async move { cached.embed("serum").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cached.provider().calls.load(Ordering::SeqCst), 1);
        assert!(cached.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let provider = CountingProvider {
            fail: true,
            ..CountingProvider::new()
        };
        let cached = CachedProvider::new(provider, EmbeddingCache::new(10));

        assert!(cached.embed("lotion").await.is_err());
        assert!(cached.embed("lotion").await.is_err());

        assert_eq!(cached.provider().calls.load(Ordering::SeqCst), 2);
        assert!(cached.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_not_cached() {
        let cached = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(10))
            .with_dimension(2);

        for _ in 0..2 {
            let err = cached.embed("serum").await.unwrap_err();
            assert!(matches!(
                err,
                EmbeddingError::DimensionMismatch {
                    expected: 2,
                    actual: 3
                }
            ));
        }

        assert_eq!(cached.provider().calls.load(Ordering::SeqCst), 2);
        assert!(cached.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_miss_releases_gate() {
        let provider = CountingProvider {
            delay: Duration::from_secs(5),
            ..CountingProvider::new()
        };
        let cached = CachedProvider::new(provider, EmbeddingCache::new(10));

        let abandoned = tokio::time::timeout(Duration::from_millis(10), cached.embed("soap")).await;
        assert!(abandoned.is_err());

        assert!(cached.inflight.lock().unwrap().is_empty());
    }
}
