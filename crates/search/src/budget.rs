use crate::error::{Result, SearchError};
use context_code_chunker::{estimate_tokens, CodeChunk};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Counts tokens the way the downstream model does
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn name(&self) -> &str;
}

/// Byte-length heuristic, about 4 bytes per token
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingTokenizer;

impl Tokenizer for EstimatingTokenizer {
    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    fn name(&self) -> &str {
        "estimate"
    }
}

/// Exact counts with the `cl100k_base` BPE
#[derive(Clone)]
pub struct BpeTokenizer {
    bpe: Arc<CoreBPE>,
}

impl BpeTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| SearchError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        "cl100k"
    }
}

/// Chunks selected for one response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackedContext {
    pub items: Vec<CodeChunk>,
    pub tokens_used: usize,
}

/// Greedy all-or-nothing packing under a token ceiling
#[derive(Clone)]
pub struct BudgetPacker {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for BudgetPacker {
    fn default() -> Self {
        Self::new(Arc::new(EstimatingTokenizer))
    }
}

impl BudgetPacker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Take chunks in rank order until the next one would overflow `budget`.
    ///
    /// Chunks are never truncated, and packing stops at the first chunk that
    /// does not fit even if a later, smaller one would. `tokens_used` never
    /// exceeds `budget`.
    pub fn pack(&self, ranked: Vec<CodeChunk>, budget: usize) -> PackedContext {
        let mut packed = PackedContext::default();
        for chunk in ranked {
            let cost = self.tokenizer.count(&chunk.content);
            match packed.tokens_used.checked_add(cost) {
                Some(total) if total <= budget => {
                    packed.tokens_used = total;
                    packed.items.push(chunk);
                }
                _ => {
                    log::trace!(
                        "Budget {budget} reached at {} ({cost} tokens, {} used)",
                        chunk.id(),
                        packed.tokens_used
                    );
                    break;
                }
            }
        }
        packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn chunk_of(tokens: usize, tag: usize) -> CodeChunk {
        CodeChunk::new(format!("f{tag}.rs"), 1, 1, "abcd".repeat(tokens))
    }

    #[test]
    fn zero_candidates_use_zero_tokens() {
        let packed = BudgetPacker::default().pack(Vec::new(), 100);
        assert_eq!(packed, PackedContext::default());
    }

    #[test]
    fn oversized_chunk_is_never_split() {
        let packed = BudgetPacker::default().pack(vec![chunk_of(1000, 0)], 1);
        assert!(packed.items.is_empty());
        assert_eq!(packed.tokens_used, 0);
    }

    #[test]
    fn stops_at_first_chunk_that_does_not_fit() {
        let packed = BudgetPacker::default().pack(
            vec![chunk_of(4, 0), chunk_of(5, 1), chunk_of(8, 2), chunk_of(1, 3)],
            10,
        );
        let paths: Vec<_> = packed.items.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(paths, vec!["f0.rs", "f1.rs"]);
        assert_eq!(packed.tokens_used, 9);
    }

    #[test]
    fn exact_fit_is_included() {
        let packed = BudgetPacker::default().pack(vec![chunk_of(3, 0), chunk_of(7, 1)], 10);
        assert_eq!(packed.items.len(), 2);
        assert_eq!(packed.tokens_used, 10);
    }

    #[test]
    fn bpe_counts_real_tokens() {
        let tokenizer = BpeTokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.count(""), 0);
        assert!(tokenizer.count("fn main() { println!(\"hello\"); }") > 3);
        assert_eq!(tokenizer.name(), "cl100k");
    }

    proptest! {
        #[test]
        fn proptest_tokens_used_within_budget(
            sizes in prop::collection::vec(0usize..50, 0..30),
            budget in 0usize..200,
        ) {
            let ranked: Vec<_> = sizes.iter().enumerate().map(|(i, s)| chunk_of(*s, i)).collect();
            let packed = BudgetPacker::default().pack(ranked.clone(), budget);

            prop_assert!(packed.tokens_used <= budget);
            let counted: usize = packed.items.iter().map(CodeChunk::estimated_tokens).sum();
            prop_assert_eq!(counted, packed.tokens_used);
            // a prefix of the ranked list
            prop_assert_eq!(&ranked[..packed.items.len()], &packed.items[..]);
        }
    }
}
