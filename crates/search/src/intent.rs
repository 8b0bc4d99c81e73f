use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the user wants done with the code.
///
/// Declaration order matters: on equal scores the earlier intent wins, so
/// `Explain` is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Explain,
    BugFix,
    Refactor,
    Generate,
    Test,
}

impl Intent {
    pub const ALL: [Self; 5] = [
        Self::Explain,
        Self::BugFix,
        Self::Refactor,
        Self::Generate,
        Self::Test,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::BugFix => "bug_fix",
            Self::Refactor => "refactor",
            Self::Generate => "generate",
            Self::Test => "test",
        }
    }

    /// Keyword groups and their weights
    #[must_use]
    pub const fn keyword_groups(self) -> &'static [KeywordGroup] {
        match self {
            Self::Explain => EXPLAIN_KEYWORDS,
            Self::BugFix => BUG_FIX_KEYWORDS,
            Self::Refactor => REFACTOR_KEYWORDS,
            Self::Generate => GENERATE_KEYWORDS,
            Self::Test => TEST_KEYWORDS,
        }
    }
}

/// Keywords matched as lower-case substrings, and the weight each hit adds
pub type KeywordGroup = (&'static [&'static str], u32);

const EXPLAIN_KEYWORDS: &[KeywordGroup] = &[
    (&["explain", "what", "how", "why", "describe", "tell me"], 3),
    (&["does", "work", "mean", "purpose", "do"], 2),
];

const BUG_FIX_KEYWORDS: &[KeywordGroup] = &[
    (&["bug", "error", "fix", "broken", "issue", "problem"], 5),
    (&["debug", "failing", "crash", "wrong", "incorrect"], 4),
    (&["not working", "doesn't work", "fails", "fail"], 4),
];

const REFACTOR_KEYWORDS: &[KeywordGroup] = &[
    (&["refactor", "improve", "optimize", "clean"], 5),
    (&["better", "simplify", "reorganize", "restructure"], 4),
    (&["readable", "maintainable", "performance"], 3),
];

const GENERATE_KEYWORDS: &[KeywordGroup] = &[
    (&["create", "generate", "implement", "write"], 4),
    (&["add", "new", "build", "make", "develop"], 3),
    (&["function", "class", "method", "component", "feature"], 2),
];

const TEST_KEYWORDS: &[KeywordGroup] = &[
    (&["test", "tests", "spec", "specs", "coverage", "unit test"], 6),
    (&["testing", "assert", "expect", "mock"], 5),
];

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized || intent.as_str().replace('_', "") == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown intent {s:?} (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    /// In `[0, 1]`; never zero
    pub confidence: f32,
}

/// Tunable constants of the keyword classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierTuning {
    /// Score that maps to full confidence
    pub confidence_divisor: f32,
    /// Confidence reported when no keyword matched
    pub min_confidence: f32,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            confidence_divisor: 10.0,
            min_confidence: 0.3,
        }
    }
}

/// Deterministic keyword-weight intent classifier
#[derive(Debug, Clone, Default)]
pub struct IntentClassifier {
    tuning: ClassifierTuning,
}

impl IntentClassifier {
    #[must_use]
    pub const fn new(tuning: ClassifierTuning) -> Self {
        Self { tuning }
    }

    /// Sum of group weights over every keyword found in `lowered`
    #[must_use]
    pub fn score(intent: Intent, lowered: &str) -> u32 {
        intent
            .keyword_groups()
            .iter()
            .map(|(keywords, weight)| {
                let hits = keywords.iter().filter(|k| lowered.contains(*k)).count();
                u32::try_from(hits).unwrap_or(u32::MAX).saturating_mul(*weight)
            })
            .sum()
    }

    #[must_use]
    pub fn classify(&self, input: &str) -> IntentResult {
        let lowered = input.to_lowercase();

        let mut best = Intent::Explain;
        let mut best_score = 0u32;
        for intent in Intent::ALL {
            let score = Self::score(intent, &lowered);
            if score > best_score {
                best = intent;
                best_score = score;
            }
        }

        let confidence = if best_score == 0 {
            self.tuning.min_confidence
        } else {
            #[allow(clippy::cast_precision_loss)]
            let raw = best_score as f32 / self.tuning.confidence_divisor.max(f32::EPSILON);
            raw.min(1.0)
        };

        log::debug!("Classified {input:?} as {best} (score {best_score}, confidence {confidence:.2})");
        IntentResult {
            intent: best,
            confidence,
        }
    }
}
