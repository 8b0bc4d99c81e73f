//! # Context Engine
//!
//! Keeps a workspace index current and answers "relevant code for this
//! request within N tokens".
//!
//! ```text
//! Workspace ──events──> FileWatcher ──debounced──> IncrementalIndexer
//!                                                    │          │
//!                                           MetadataStore   VectorStore
//!                                                    │          │
//! ContextQuery ──> IntentClassifier ──> Retrievers ──┴──────────┘
//!                                           │
//!                                   Ranker ──> BudgetPacker ──> ContextResult
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use context_engine::{ContextEngine, ContextQuery, EngineConfig};
//! use context_indexer::FsWorkspace;
//! use std::sync::Arc;
//!
//! # async fn run() -> context_engine::Result<()> {
//! let engine = ContextEngine::new(EngineConfig::default(), Arc::new(FsWorkspace::new(".")))?;
//! engine.initialize().await?;
//! let result = engine.query(ContextQuery::new("fix the config parser error", 2000)).await?;
//! println!("{} chunks, {} tokens", result.items.len(), result.tokens_used);
//! engine.dispose().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;

pub use config::{
    EmbeddingSettings, EngineConfig, RetrievalSettings, TokenizerKind, WatcherSettings,
    METADATA_FILE, STORAGE_DIR_ENV, VECTORS_FILE,
};
pub use engine::{ContextEngine, ContextQuery, ContextResult, Lifecycle};
pub use error::{EngineError, Result};
