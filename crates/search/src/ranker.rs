use context_code_chunker::{ChunkKey, CodeChunk};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Merges candidate lists into one ordering
pub trait Ranker: Send + Sync {
    fn rank(&self, candidates: Vec<CodeChunk>, query: &str) -> Vec<CodeChunk>;
}

/// Deduplicates by chunk identity keeping the best score, then orders by
/// score descending.
///
/// Equal scores prefer the shorter chunk; path and start line make the order
/// total so repeated queries return identical results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreRanker;

impl Ranker for ScoreRanker {
    fn rank(&self, candidates: Vec<CodeChunk>, _query: &str) -> Vec<CodeChunk> {
        let mut best: HashMap<ChunkKey, CodeChunk> = HashMap::with_capacity(candidates.len());
        for chunk in candidates {
            match best.entry(chunk.key()) {
                Entry::Occupied(mut slot) => {
                    if chunk.score_or_zero() > slot.get().score_or_zero() {
                        slot.insert(chunk);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(chunk);
                }
            }
        }

        let mut ranked: Vec<CodeChunk> = best.into_values().collect();
        ranked.sort_by(compare_ranked);
        ranked
    }
}

fn compare_ranked(a: &CodeChunk, b: &CodeChunk) -> Ordering {
    b.score_or_zero()
        .total_cmp(&a.score_or_zero())
        .then_with(|| a.line_count().cmp(&b.line_count()))
        .then_with(|| a.file_path.cmp(&b.file_path))
        .then_with(|| a.start_line.cmp(&b.start_line))
}
