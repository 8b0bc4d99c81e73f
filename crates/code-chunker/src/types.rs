use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChunkerError, Result};

/// A contiguous line range of one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    /// Source file path
    pub file_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// The actual code content
    pub content: String,

    /// Relevance score assigned by a retriever or the ranker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl CodeChunk {
    /// Create a new unscored chunk
    #[must_use]
    pub const fn new(file_path: String, start_line: usize, end_line: usize, content: String) -> Self {
        Self {
            file_path,
            start_line,
            end_line,
            content,
            score: None,
        }
    }

    /// Create a chunk, rejecting inverted or zero-based line ranges
    pub fn checked(
        file_path: String,
        start_line: usize,
        end_line: usize,
        content: String,
    ) -> Result<Self> {
        if start_line == 0 || end_line < start_line {
            return Err(ChunkerError::InvalidBoundaries {
                start: start_line,
                end: end_line,
            });
        }
        Ok(Self::new(file_path, start_line, end_line, content))
    }

    /// Builder: attach a score
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Score, treating an unscored chunk as zero
    #[must_use]
    pub fn score_or_zero(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }

    /// Get the number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Identity of this chunk
    #[must_use]
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            file_path: self.file_path.clone(),
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }

    /// Stable string id, `path:start:end`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.file_path, self.start_line, self.end_line)
    }

    /// Get estimated token count
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// `(file_path, start_line, end_line)` identity of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.start_line, self.end_line)
    }
}

/// Rough token estimate for code: about 4 bytes per token, never zero for
/// non-empty text
#[must_use]
pub fn estimate_tokens(content: &str) -> usize {
    if content.is_empty() {
        return 0;
    }
    (content.len() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_id_agree() {
        let chunk = CodeChunk::new("src/lib.rs".into(), 3, 9, "fn a() {}".into());
        assert_eq!(chunk.id(), "src/lib.rs:3:9");
        assert_eq!(chunk.key().to_string(), chunk.id());
        assert_eq!(chunk.line_count(), 7);
    }

    #[test]
    fn checked_rejects_inverted_range() {
        assert!(CodeChunk::checked("a.rs".into(), 5, 4, String::new()).is_err());
        assert!(CodeChunk::checked("a.rs".into(), 0, 4, String::new()).is_err());
        assert!(CodeChunk::checked("a.rs".into(), 4, 4, String::new()).is_ok());
    }

    #[test]
    fn token_estimate_is_nonzero_for_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }
}
