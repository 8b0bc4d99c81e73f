use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Retriever {name} failed: {message}")]
    Retriever { name: String, message: String },

    #[error("Vector store error: {0}")]
    VectorStore(#[from] context_vector_store::VectorStoreError),

    #[error("Metadata store error: {0}")]
    Metadata(#[from] context_indexer::MetadataError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}
