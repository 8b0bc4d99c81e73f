use context_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};

/// A chunk row as persisted by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub chunk: CodeChunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Matched chunk, with `score` filled in
    pub chunk: CodeChunk,
    /// Similarity in `[0, 1]`
    pub score: f32,
}
