use serde::{Deserialize, Serialize};

/// Statistics about a full workspace pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Files whose content changed and were (re)processed
    pub files: usize,

    /// Chunks written for those files
    pub chunks: usize,

    /// Files skipped because their hash was unchanged
    pub unchanged: usize,

    /// Records purged for files no longer in the workspace
    pub removed: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Errors encountered
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, chunks: usize) {
        self.files += 1;
        self.chunks += chunks;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}

/// Read-only snapshot of indexing activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub is_indexing: bool,
    pub files_indexed: usize,
    pub total_files: usize,
    /// Coarse fraction in `[0, 1]`, monotonic within one pass
    pub progress: f32,
}
