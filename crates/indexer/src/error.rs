use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Indexer must be initialized before use")]
    Uninitialized,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] context_vector_store::VectorStoreError),

    #[error("Chunker error: {0}")]
    Chunker(#[from] context_code_chunker::ChunkerError),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata store must be initialized before use")]
    Uninitialized,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
