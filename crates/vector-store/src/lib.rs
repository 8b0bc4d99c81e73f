//! # Context Vector Store
//!
//! Embedding providers and similarity search for code chunks.
//!
//! ## Features
//!
//! - **Pluggable embeddings** through the [`EmbeddingProvider`] trait
//! - **Offline embedder** ([`HashingEmbedder`]) based on identifier feature hashing
//! - **Batching and caching** via [`CachedEmbedder`]
//! - **File-keyed storage**: every write replaces one file's chunk set
//! - **Persistent storage** with atomic JSON snapshots written on `flush`/`dispose`
//!
//! ## Architecture
//!
//! ```text
//! CodeChunk[]
//!     │
//!     ├──> EmbeddingProvider (CachedEmbedder -> HashingEmbedder / remote)
//!     │      └─> Vector[dimension]
//!     │
//!     └──> VectorStore (FlatVectorStore)
//!            ├─> file_path -> rows
//!            └─> cosine search, score in [0, 1]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_vector_store::{EmbeddingProvider, FlatVectorStore, HashingEmbedder, VectorStore};
//! use context_code_chunker::CodeChunk;
//!
//! #[tokio::main]
//! async fn main() -> context_vector_store::Result<()> {
//!     let embedder = HashingEmbedder::default();
//!     let store = FlatVectorStore::persistent("vectors.json");
//!     store.initialize().await?;
//!
//!     let chunk = CodeChunk::new("src/lib.rs".into(), 1, 3, "fn handle_error() {}".into());
//!     let vectors = embedder.embed(&[chunk.content.clone()]).await?;
//!     store.add("src/lib.rs", vec![chunk], vectors).await?;
//!
//!     let query = embedder.embed(&["error handling".to_string()]).await?;
//!     for result in store.search(&query[0], 10).await? {
//!         println!("{}: {:.3}", result.chunk.file_path, result.score);
//!     }
//!
//!     store.dispose().await?;
//!     Ok(())
//! }
//! ```

mod cache;
mod embeddings;
mod error;
mod store;
mod types;

pub use cache::CachedEmbedder;
pub use embeddings::{cosine_similarity, identifier_tokens, EmbeddingProvider, HashingEmbedder};
pub use error::{Result, VectorStoreError};
pub use store::{FlatVectorStore, VectorStore};
pub use types::{SearchResult, StoredChunk};

// Re-export code chunker types for convenience
pub use context_code_chunker::CodeChunk;
