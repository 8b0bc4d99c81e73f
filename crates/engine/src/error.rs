use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Context engine is not initialized")]
    NotInitialized,

    #[error("Context engine has been disposed")]
    Disposed,

    #[error("Token budget must be greater than zero")]
    InvalidBudget,

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Every retriever failed: {0}")]
    AllRetrieversFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Indexer error: {0}")]
    Indexer(#[from] context_indexer::IndexerError),

    #[error("Search error: {0}")]
    Search(#[from] context_search::SearchError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] context_vector_store::VectorStoreError),

    #[error("Metadata store error: {0}")]
    Metadata(#[from] context_indexer::MetadataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
