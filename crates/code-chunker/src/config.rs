use serde::{Deserialize, Serialize};

/// Configuration for code chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Chunking strategy to use
    pub strategy: ChunkingStrategy,

    /// Target chunk size in tokens (soft limit, cut at the next blank line)
    pub target_chunk_tokens: usize,

    /// Maximum chunk size in tokens (hard limit)
    pub max_chunk_tokens: usize,

    /// Maximum chunk size in lines (hard limit)
    pub max_chunk_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::LineWindow,
            target_chunk_tokens: 384,
            max_chunk_tokens: 512,
            max_chunk_lines: 120,
        }
    }
}

impl ChunkerConfig {
    /// One chunk per file
    pub fn whole_file() -> Self {
        Self {
            strategy: ChunkingStrategy::WholeFile,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_tokens == 0 {
            return Err("max_chunk_tokens must be > 0".to_string());
        }

        if self.max_chunk_lines == 0 {
            return Err("max_chunk_lines must be > 0".to_string());
        }

        if self.target_chunk_tokens > self.max_chunk_tokens {
            return Err(format!(
                "target_chunk_tokens ({}) cannot exceed max_chunk_tokens ({})",
                self.target_chunk_tokens, self.max_chunk_tokens
            ));
        }

        Ok(())
    }
}

/// Strategy for chunking code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// The whole file is a single chunk
    WholeFile,

    /// Line windows that prefer blank-line boundaries
    LineWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ChunkerConfig::default().validate().is_ok());
        assert!(ChunkerConfig::whole_file().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChunkerConfig::default();

        config.target_chunk_tokens = 2000;
        config.max_chunk_tokens = 1000;
        assert!(config.validate().is_err());

        config.target_chunk_tokens = 0;
        config.max_chunk_tokens = 0;
        assert!(config.validate().is_err());

        config.max_chunk_tokens = 10;
        config.max_chunk_lines = 0;
        assert!(config.validate().is_err());

        config.max_chunk_lines = 5;
        assert!(config.validate().is_ok());
    }
}
