use crate::error::Result;
use crate::plan::RetrieverKind;
use async_trait::async_trait;
use context_code_chunker::CodeChunk;
use context_indexer::MetadataStore;
use context_vector_store::{EmbeddingProvider, VectorStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A pluggable source of scored candidate chunks.
///
/// Retrievers are read-only and may run concurrently with each other and
/// with indexing; a failure is reported to the caller, which decides whether
/// the remaining retrievers are enough.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `limit` chunks relevant to `query`, each carrying a score
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<CodeChunk>>;
}

/// Nearest neighbours of the embedded query
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    fn name(&self) -> &'static str {
        RetrieverKind::Semantic.as_str()
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<CodeChunk>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(vector) = vectors.pop() else {
            return Ok(Vec::new());
        };

        let results = self.store.search(&vector, limit).await?;
        Ok(results
            .into_iter()
            .map(|hit| hit.chunk.with_score(hit.score))
            .collect())
    }
}

/// BM25 full-text match over indexed chunk text
pub struct LexicalRetriever {
    metadata: Arc<MetadataStore>,
}

impl LexicalRetriever {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    fn name(&self) -> &'static str {
        RetrieverKind::Lexical.as_str()
    }

    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<CodeChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.metadata.full_text_search(query, limit).await?)
    }
}

/// Chunks of files modified within `window`, newest first.
///
/// Ignores the query text.
pub struct RecencyRetriever {
    metadata: Arc<MetadataStore>,
    window: Duration,
}

impl RecencyRetriever {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(metadata: Arc<MetadataStore>, window: Duration) -> Self {
        Self { metadata, window }
    }

    fn threshold_ms(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        let window = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(window)
    }
}

#[async_trait]
impl Retriever for RecencyRetriever {
    fn name(&self) -> &'static str {
        RetrieverKind::Recency.as_str()
    }

    async fn retrieve(&self, _query: &str, limit: usize) -> Result<Vec<CodeChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .metadata
            .get_recently_modified_files(self.threshold_ms(), limit)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_indexer::FileRecord;
    use context_vector_store::{FlatVectorStore, HashingEmbedder};
    use pretty_assertions::assert_eq;

    fn chunk(path: &str, start: usize, end: usize, content: &str) -> CodeChunk {
        CodeChunk::new(path.to_string(), start, end, content.to_string())
    }

    fn record(path: &str, modified_ms: i64) -> FileRecord {
        FileRecord {
            file_path: path.to_string(),
            content_hash: "h".to_string(),
            last_modified_ms: modified_ms,
            indexed: true,
            indexed_at_ms: Some(modified_ms),
        }
    }

    fn now_ms() -> i64 {
        i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_millis(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn semantic_over_empty_store_is_empty() {
        let store: Arc<dyn VectorStore> = Arc::new(FlatVectorStore::in_memory());
        store.initialize().await.unwrap();
        let retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::new(64)), store);

        assert!(retriever.retrieve("parse config", 10).await.unwrap().is_empty());
        assert!(retriever.retrieve("   ", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn semantic_finds_closest_chunk() {
        let embedder = Arc::new(HashingEmbedder::new(128));
        let store: Arc<dyn VectorStore> = Arc::new(FlatVectorStore::in_memory());
        store.initialize().await.unwrap();

        let chunks = vec![
            chunk("src/config.rs", 1, 3, "fn parse_config(path: &str) -> Config"),
            chunk("src/render.rs", 1, 3, "fn draw_triangle(canvas: &mut Canvas)"),
        ];
        for c in &chunks {
            let vectors = embedder.embed(&[c.content.clone()]).await.unwrap();
            store.add(&c.file_path, vec![c.clone()], vectors).await.unwrap();
        }

        let retriever = SemanticRetriever::new(embedder, store);
        let hits = retriever.retrieve("parse config", 2).await.unwrap();
        assert_eq!(hits[0].file_path, "src/config.rs");
        assert!(hits.iter().all(|h| h.score.is_some()));
        assert_eq!(retriever.name(), "semantic");
    }

    #[tokio::test]
    async fn lexical_and_recency_read_the_metadata_store() {
        let metadata = Arc::new(MetadataStore::in_memory());
        metadata.initialize().await.unwrap();

        let now = now_ms();
        metadata
            .commit_file(
                record("src/fresh.rs", now),
                vec![chunk("src/fresh.rs", 1, 2, "fn load_manifest() {}")],
            )
            .await
            .unwrap();
        metadata
            .commit_file(
                record("src/stale.rs", now - 3 * 24 * 3_600_000),
                vec![chunk("src/stale.rs", 1, 2, "fn draw_sprite() {}")],
            )
            .await
            .unwrap();

        let lexical = LexicalRetriever::new(Arc::clone(&metadata));
        let hits = lexical.retrieve("manifest", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "src/fresh.rs");

        let recency = RecencyRetriever::new(metadata, RecencyRetriever::DEFAULT_WINDOW);
        let recent = recency.retrieve("anything", 10).await.unwrap();
        let paths: Vec<_> = recent.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/fresh.rs"]);
    }

    #[tokio::test]
    async fn uninitialized_metadata_is_an_error() {
        let lexical = LexicalRetriever::new(Arc::new(MetadataStore::in_memory()));
        assert!(lexical.retrieve("anything", 5).await.is_err());
    }
}
