use crate::config::{ChunkerConfig, ChunkingStrategy};
use crate::error::{ChunkerError, Result};
use crate::types::{estimate_tokens, CodeChunk};

/// Main chunker interface for processing code
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker with configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk code from a string.
    ///
    /// Empty or whitespace-only content yields no chunks.
    #[must_use]
    pub fn chunk_str(&self, content: &str, file_path: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = content.lines().collect();
        let chunks = match self.config.strategy {
            ChunkingStrategy::WholeFile => vec![CodeChunk::new(
                file_path.to_string(),
                1,
                lines.len(),
                content.to_string(),
            )],
            ChunkingStrategy::LineWindow => self.chunk_line_windows(&lines, file_path),
        };

        log::trace!("Chunked {file_path} into {} chunks", chunks.len());
        chunks
    }

    fn chunk_line_windows(&self, lines: &[&str], file_path: &str) -> Vec<CodeChunk> {
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut tokens = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let line_tokens = estimate_tokens(line) + 1;
            let window_len = idx - start;

            // Hard limits: close the window before this line would overflow it.
            if window_len > 0
                && (tokens + line_tokens > self.config.max_chunk_tokens
                    || window_len >= self.config.max_chunk_lines)
            {
                push_window(&mut chunks, lines, start, idx - 1, file_path);
                start = idx;
                tokens = 0;
            }

            tokens += line_tokens;

            if tokens >= self.config.target_chunk_tokens && line.trim().is_empty() {
                push_window(&mut chunks, lines, start, idx, file_path);
                start = idx + 1;
                tokens = 0;
            }
        }

        if start < lines.len() {
            push_window(&mut chunks, lines, start, lines.len() - 1, file_path);
        }

        chunks
    }
}

/// Emit lines `[first, last]` (0-indexed) with surrounding blank lines trimmed.
fn push_window(chunks: &mut Vec<CodeChunk>, lines: &[&str], first: usize, last: usize, file_path: &str) {
    let window = &lines[first..=last];
    let Some(lead) = window.iter().position(|l| !l.trim().is_empty()) else {
        return;
    };
    let tail = window
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(lead);

    let content = window[lead..=tail].join("\n");
    chunks.push(CodeChunk::new(
        file_path.to_string(),
        first + lead + 1,
        first + tail + 1,
        content,
    ));
}
