use crate::error::{EngineError, Result};
use context_code_chunker::ChunkerConfig;
use context_indexer::{
    default_index_concurrency, parse_index_concurrency, IgnoreFilter, DEFAULT_DEBOUNCE,
    DEFAULT_IGNORE_PATTERNS, INDEX_CONCURRENCY_ENV,
};
use context_search::ClassifierTuning;
use context_vector_store::{CachedEmbedder, HashingEmbedder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STORAGE_DIR_ENV: &str = "CONTEXT_ENGINE_STORAGE_DIR";

pub const METADATA_FILE: &str = "metadata.sqlite";
pub const VECTORS_FILE: &str = "vectors.json";

/// Engine settings, loaded from TOML with environment overrides.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory for `metadata.sqlite` and `vectors.json`; in-memory when unset
    pub storage_dir: Option<PathBuf>,

    /// Run a full workspace pass in the background after `initialize`
    pub index_on_startup: bool,

    pub index_concurrency: usize,

    pub watcher: WatcherSettings,
    pub chunker: ChunkerConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub classifier: ClassifierTuning,
    pub tokenizer: TokenizerKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            index_on_startup: true,
            index_concurrency: default_index_concurrency(),
            watcher: WatcherSettings::default(),
            chunker: ChunkerConfig::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
            classifier: ClassifierTuning::default(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub debounce_ms: u64,
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(300),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl WatcherSettings {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Texts per provider call
    pub batch_size: usize,
    /// Cached vectors, keyed by exact text
    pub cache_capacity: usize,
    /// Vector width of the built-in hashing embedder
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            batch_size: CachedEmbedder::DEFAULT_BATCH_SIZE,
            cache_capacity: CachedEmbedder::DEFAULT_CACHE_CAPACITY,
            dimension: HashingEmbedder::DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates requested from each retriever before ranking
    pub candidates_per_retriever: usize,
    /// How far back the recency retriever looks
    pub recency_window_secs: u64,
    /// Score multiplier for chunks of the active file
    pub active_file_boost: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            candidates_per_retriever: 20,
            recency_window_secs: 24 * 60 * 60,
            active_file_boost: 1.15,
        }
    }
}

impl RetrievalSettings {
    #[must_use]
    pub const fn recency_window(&self) -> Duration {
        Duration::from_secs(self.recency_window_secs)
    }
}

/// How packed chunks are measured against the token budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// About four bytes per token
    #[default]
    Estimate,
    /// OpenAI `cl100k_base` BPE
    Cl100k,
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| EngineError::config(e.to_string()))
    }

    /// Load `path` (or defaults when `None`), apply environment overrides and
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    EngineError::config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `CONTEXT_ENGINE_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(STORAGE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        let raw = lookup(INDEX_CONCURRENCY_ENV);
        self.index_concurrency = parse_index_concurrency(raw.as_deref(), self.index_concurrency);
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker.validate().map_err(EngineError::Config)?;

        if self.index_concurrency == 0 {
            return Err(EngineError::config("index_concurrency must be > 0"));
        }
        if self.embedding.batch_size == 0 {
            return Err(EngineError::config("embedding.batch_size must be > 0"));
        }
        if self.embedding.cache_capacity == 0 {
            return Err(EngineError::config("embedding.cache_capacity must be > 0"));
        }
        if self.embedding.dimension == 0 {
            return Err(EngineError::config("embedding.dimension must be > 0"));
        }
        if self.retrieval.candidates_per_retriever == 0 {
            return Err(EngineError::config(
                "retrieval.candidates_per_retriever must be > 0",
            ));
        }

        let boost = self.retrieval.active_file_boost;
        if !boost.is_finite() || boost <= 0.0 {
            return Err(EngineError::config(format!(
                "retrieval.active_file_boost must be a positive number, got {boost}"
            )));
        }
        let divisor = self.classifier.confidence_divisor;
        if !divisor.is_finite() || divisor <= 0.0 {
            return Err(EngineError::config(format!(
                "classifier.confidence_divisor must be a positive number, got {divisor}"
            )));
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence)
            || self.classifier.min_confidence == 0.0
        {
            return Err(EngineError::config("classifier.min_confidence must be in (0, 1]"));
        }

        IgnoreFilter::new(&self.watcher.ignore_patterns, Vec::new())
            .map_err(|e| EngineError::config(format!("watcher.ignore_patterns: {e}")))?;
        Ok(())
    }

    #[must_use]
    pub fn metadata_path(&self) -> Option<PathBuf> {
        self.storage_dir.as_ref().map(|dir| dir.join(METADATA_FILE))
    }

    #[must_use]
    pub fn vectors_path(&self) -> Option<PathBuf> {
        self.storage_dir.as_ref().map(|dir| dir.join(VECTORS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::ChunkingStrategy;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.watcher.debounce(), Duration::from_millis(300));
        assert_eq!(config.embedding.batch_size, 10);
        assert_eq!(config.retrieval.candidates_per_retriever, 20);
        assert_eq!(config.tokenizer, TokenizerKind::Estimate);
        assert_eq!(config.metadata_path(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            storage_dir = "/tmp/ctx"
            index_on_startup = false
            tokenizer = "cl100k"

            [chunker]
            strategy = "whole_file"

            [retrieval]
            active_file_boost = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/ctx")));
        assert!(!config.index_on_startup);
        assert_eq!(config.tokenizer, TokenizerKind::Cl100k);
        assert_eq!(config.chunker.strategy, ChunkingStrategy::WholeFile);
        assert_eq!(config.chunker.max_chunk_tokens, 512);
        assert_eq!(config.retrieval.active_file_boost, 1.5);
        assert_eq!(config.retrieval.candidates_per_retriever, 20);
        assert_eq!(
            config.vectors_path(),
            Some(PathBuf::from("/tmp/ctx").join(VECTORS_FILE))
        );
    }

    #[test]
    fn unknown_tokenizer_is_rejected() {
        assert!(EngineConfig::from_toml_str("tokenizer = \"gpt2\"").is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (STORAGE_DIR_ENV, "/var/ctx"),
            (INDEX_CONCURRENCY_ENV, "3"),
        ]);
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/ctx")));
        assert_eq!(config.index_concurrency, 3);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retrieval.candidates_per_retriever = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.chunker.max_chunk_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.watcher.ignore_patterns = vec!["src/[".to_string()];
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retrieval.active_file_boost = f32::NAN;
        assert!(config.validate().is_err());
    }
}
