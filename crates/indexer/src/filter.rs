use crate::error::{IndexerError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/**",
    ".git/**",
    "dist/**",
    "build/**",
    "target/**",
    "*.log",
];

/// Case-insensitive glob filter over workspace paths.
///
/// A pattern matches a path at any depth (`dist/**` also matches
/// `pkg/dist/x.js`), tested against both the full path and the path relative
/// to each base directory.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
    base_dirs: Vec<PathBuf>,
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S], base_dirs: Vec<PathBuf>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            builder.add(compile(pattern)?);
            if !pattern.starts_with("**/") && !pattern.starts_with('/') {
                builder.add(compile(&format!("**/{pattern}"))?);
            }
        }
        let set = builder
            .build()
            .map_err(|e| IndexerError::Watcher(format!("invalid ignore patterns: {e}")))?;
        Ok(Self { set, base_dirs })
    }

    pub fn with_defaults(base_dirs: Vec<PathBuf>) -> Result<Self> {
        Self::new(DEFAULT_IGNORE_PATTERNS, base_dirs)
    }

    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        let full = path.replace('\\', "/");
        if self.set.is_match(&full) {
            return true;
        }
        self.base_dirs.iter().any(|base| {
            Path::new(&full)
                .strip_prefix(base)
                .is_ok_and(|rel| self.set.is_match(rel))
        })
    }
}

fn compile(pattern: &str) -> Result<globset::Glob> {
    GlobBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| IndexerError::Watcher(format!("invalid ignore pattern {pattern:?}: {e}")))
}
