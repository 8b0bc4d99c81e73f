//! # Context Code Chunker
//!
//! Splits workspace files into line-bounded chunks, the atomic unit of
//! retrieval and storage.
//!
//! ## Identity
//!
//! A chunk is identified by `(file_path, start_line, end_line)`. The chunker is
//! deterministic: the same content always produces the same set of identities,
//! so re-indexing a file replaces its chunk set without leaving strays behind.
//!
//! ## Strategies
//!
//! ```text
//! Source text
//!     │
//!     ├──> WholeFile   ── one chunk spanning every line
//!     │
//!     └──> LineWindow  ── grow until target tokens, cut on a blank line,
//!                         hard-cut at max tokens / max lines
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_code_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let chunks = chunker.chunk_str("fn main() {}\n", "src/main.rs");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_line, 1);
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::Chunker;
pub use config::{ChunkerConfig, ChunkingStrategy};
pub use error::{ChunkerError, Result};
pub use types::{estimate_tokens, ChunkKey, CodeChunk};
