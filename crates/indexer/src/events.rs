use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        })
    }
}

/// One observed change to a workspace file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub file_path: String,
    /// Epoch milliseconds
    pub timestamp_ms: i64,
}

impl FileChangeEvent {
    pub fn new(kind: ChangeKind, file_path: impl Into<String>) -> Self {
        Self {
            kind,
            file_path: file_path.into(),
            timestamp_ms: crate::workspace::now_ms(),
        }
    }
}
