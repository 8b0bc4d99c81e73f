//! # Context Indexer
//!
//! Incremental, hash-addressed indexing of workspace files.
//!
//! ## Pipeline
//!
//! ```text
//! Workspace (IDE collaborator)
//!     │
//!     ├──> FileWatcher (ignore globs, per-path debounce)
//!     │      └─> created / modified / deleted
//!     │
//!     ├──> IncrementalIndexer (per-path serialization)
//!     │      ├─> SHA-256 staleness check, skip when unchanged
//!     │      ├─> Chunker
//!     │      └─> EmbeddingProvider (one batched call per file)
//!     │
//!     ├──> VectorStore   (chunk rows + vectors, written first)
//!     └──> MetadataStore (file record + FTS5 chunk text, written last)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_indexer::{FsWorkspace, IncrementalIndexer, IndexerConfig, MetadataStore};
//! use context_vector_store::{FlatVectorStore, HashingEmbedder};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> context_indexer::Result<()> {
//!     let indexer = Arc::new(IncrementalIndexer::new(
//!         Arc::new(FsWorkspace::new("/path/to/project")),
//!         Arc::new(MetadataStore::in_memory()),
//!         Arc::new(FlatVectorStore::in_memory()),
//!         Some(Arc::new(HashingEmbedder::default())),
//!         IndexerConfig::default(),
//!     )?);
//!     indexer.initialize().await?;
//!     let stats = indexer.index_workspace().await?;
//!
//!     println!("Indexed {} files, {} chunks", stats.files, stats.chunks);
//!     Ok(())
//! }
//! ```

mod admission;
mod error;
mod events;
mod filter;
mod indexer;
mod limits;
mod metadata;
mod stats;
mod watcher;
mod workspace;

pub use error::{IndexerError, MetadataError, Result};
pub use events::{ChangeKind, FileChangeEvent};
pub use filter::{IgnoreFilter, DEFAULT_IGNORE_PATTERNS};
pub use indexer::{content_hash, IncrementalIndexer, IndexOutcome, IndexerConfig};
pub use limits::{
    default_index_concurrency, parse_index_concurrency,
    INDEX_CONCURRENCY_ENV, MAX_INDEX_CONCURRENCY,
};
pub use metadata::{FileRecord, MetadataStore};
pub use stats::{IndexStats, IndexingStatus};
pub use watcher::{ChangeHandler, FileWatcher, FileWatcherConfig, ListenerId, DEFAULT_DEBOUNCE};
pub use workspace::{FsWorkspace, RawEventStream, Workspace};
