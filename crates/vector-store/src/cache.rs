use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Batching, caching front for an [`EmbeddingProvider`].
///
/// Vectors are cached by exact text. Misses are deduplicated and sent to the
/// inner provider in calls of at most `batch_size` texts.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

    pub fn new(inner: Arc<dyn EmbeddingProvider>, batch_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            batch_size: batch_size.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_defaults(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(inner, Self::DEFAULT_BATCH_SIZE, Self::DEFAULT_CACHE_CAPACITY)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, text: &str) -> Option<Vec<f32>> {
        self.cache.lock().ok()?.get(text).cloned()
    }

    fn remember(&self, text: String, vector: Vec<f32>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text, vector);
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = texts.iter().map(|t| self.cached(t)).collect();

        let mut seen = HashSet::new();
        let misses: Vec<String> = texts
            .iter()
            .zip(&out)
            .filter(|(_, hit)| hit.is_none())
            .filter(|(text, _)| seen.insert(text.as_str()))
            .map(|(text, _)| text.clone())
            .collect();

        if !misses.is_empty() {
            log::debug!(
                "Embedding {} uncached texts via {} (batch size {})",
                misses.len(),
                self.inner.name(),
                self.batch_size
            );
        }

        let mut fresh = std::collections::HashMap::with_capacity(misses.len());
        for batch in misses.chunks(self.batch_size) {
            let vectors = self.inner.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(VectorStoreError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (text, vector) in batch.iter().zip(vectors) {
                self.remember(text.clone(), vector.clone());
                fresh.insert(text.as_str(), vector);
            }
        }

        texts
            .iter()
            .zip(out.iter_mut())
            .map(|(text, slot)| {
                slot.take()
                    .or_else(|| fresh.get(text.as_str()).cloned())
                    .ok_or_else(|| VectorStoreError::Embedding(format!("no vector for text {text:?}")))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashingEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
        inner: HashingEmbedder,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn batches_misses() {
        let counting = Arc::new(CountingEmbedder::default());
        let cached = CachedEmbedder::new(counting.clone(), 2, 16);

        let out = cached.embed(&texts(&["a", "b", "c", "d", "e"])).await.unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.cache_len(), 5);
    }

    #[tokio::test]
    async fn hits_skip_provider_and_keep_order() {
        let counting = Arc::new(CountingEmbedder::default());
        let cached = CachedEmbedder::new(counting.clone(), 10, 16);

        let first = cached.embed(&texts(&["alpha", "beta"])).await.unwrap();
        let second = cached.embed(&texts(&["beta", "alpha", "beta"])).await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second[0], first[1]);
        assert_eq!(second[1], first[0]);
        assert_eq!(second[2], first[1]);
    }

    #[tokio::test]
    async fn duplicate_misses_embedded_once() {
        let counting = Arc::new(CountingEmbedder::default());
        let cached = CachedEmbedder::new(counting.clone(), 10, 16);

        cached.embed(&texts(&["x", "x", "y"])).await.unwrap();
        assert_eq!(counting.texts.load(Ordering::SeqCst), 2);

        cached.clear_cache();
        assert_eq!(cached.cache_len(), 0);
        cached.embed(&texts(&["x"])).await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let counting = Arc::new(CountingEmbedder::default());
        let cached = CachedEmbedder::new(counting.clone(), 10, 2);

        cached.embed(&texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(cached.cache_len(), 2);
    }
}
