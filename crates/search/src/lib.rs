//! # Context Search
//!
//! Turns a free-text request into a ranked, token-bounded set of chunks:
//!
//! ```text
//! request ──> IntentClassifier ──> retrieval_plan(intent)
//!                                      │
//!                  ┌───────────────────┼───────────────────┐
//!                  ▼                   ▼                   ▼
//!          SemanticRetriever   LexicalRetriever   RecencyRetriever
//!                  └───────────────────┼───────────────────┘
//!                                      ▼
//!                                 ScoreRanker ──> BudgetPacker
//! ```
//!
//! Every stage is deterministic for a fixed index snapshot.

mod budget;
mod error;
mod intent;
mod plan;
mod ranker;
mod retriever;

pub use budget::{BpeTokenizer, BudgetPacker, EstimatingTokenizer, PackedContext, Tokenizer};
pub use error::{Result, SearchError};
pub use intent::{ClassifierTuning, Intent, IntentClassifier, IntentResult, KeywordGroup};
pub use plan::{retrieval_plan, PlanEntry, RetrieverKind};
pub use ranker::{Ranker, ScoreRanker};
pub use retriever::{LexicalRetriever, RecencyRetriever, Retriever, SemanticRetriever};
