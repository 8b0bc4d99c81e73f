use crate::intent::Intent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Retrieval methods the engine knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    Semantic,
    Lexical,
    Recency,
}

impl RetrieverKind {
    pub const ALL: [Self; 3] = [Self::Semantic, Self::Lexical, Self::Recency];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Recency => "recency",
        }
    }
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retriever in a plan and the multiplier applied to its scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub kind: RetrieverKind,
    pub weight: f32,
}

const fn entry(kind: RetrieverKind, weight: f32) -> PlanEntry {
    PlanEntry { kind, weight }
}

const EXPLAIN_PLAN: &[PlanEntry] = &[
    entry(RetrieverKind::Semantic, 1.0),
    entry(RetrieverKind::Lexical, 0.6),
];

const BUG_FIX_PLAN: &[PlanEntry] = &[
    entry(RetrieverKind::Recency, 0.8),
    entry(RetrieverKind::Lexical, 1.0),
    entry(RetrieverKind::Semantic, 0.7),
];

const REFACTOR_PLAN: &[PlanEntry] = &[
    entry(RetrieverKind::Semantic, 1.0),
    entry(RetrieverKind::Lexical, 0.8),
];

const GENERATE_PLAN: &[PlanEntry] = &[
    entry(RetrieverKind::Semantic, 1.0),
    entry(RetrieverKind::Lexical, 0.5),
];

const TEST_PLAN: &[PlanEntry] = &[
    entry(RetrieverKind::Lexical, 1.0),
    entry(RetrieverKind::Semantic, 0.8),
];

/// Retrievers to run for `intent`, in the order their results are reported.
///
/// Bug fixes lean on recently edited files and exact identifiers; everything
/// else starts from semantic similarity.
#[must_use]
pub const fn retrieval_plan(intent: Intent) -> &'static [PlanEntry] {
    match intent {
        Intent::Explain => EXPLAIN_PLAN,
        Intent::BugFix => BUG_FIX_PLAN,
        Intent::Refactor => REFACTOR_PLAN,
        Intent::Generate => GENERATE_PLAN,
        Intent::Test => TEST_PLAN,
    }
}
