use crate::error::{IndexerError, Result};
use crate::events::{ChangeKind, FileChangeEvent};
use async_trait::async_trait;
use ignore::WalkBuilder;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Host editor surface the indexer depends on.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn read_file(&self, path: &str) -> std::io::Result<String>;

    fn workspace_dirs(&self) -> Vec<PathBuf>;

    /// Every candidate file under the workspace dirs (`.gitignore` aware).
    async fn list_files(&self) -> std::io::Result<Vec<String>> {
        let dirs = self.workspace_dirs();
        tokio::task::spawn_blocking(move || walk_files(&dirs))
            .await
            .map_err(std::io::Error::other)
    }

    /// Last modification time in epoch milliseconds, if known
    async fn modified_at(&self, _path: &str) -> Option<i64> {
        None
    }

    /// Native change stream, if the host provides one
    fn watch(&self) -> Result<Option<RawEventStream>> {
        Ok(None)
    }
}

/// Raw change events before filtering and debouncing.
pub struct RawEventStream {
    events: mpsc::Receiver<FileChangeEvent>,
    _source: Option<Box<dyn Send>>,
}

impl RawEventStream {
    /// `source` is kept alive for as long as the stream is.
    pub fn new(events: mpsc::Receiver<FileChangeEvent>, source: Option<Box<dyn Send>>) -> Self {
        Self {
            events,
            _source: source,
        }
    }

    pub async fn recv(&mut self) -> Option<FileChangeEvent> {
        self.events.recv().await
    }
}

fn walk_files(dirs: &[PathBuf]) -> Vec<String> {
    let mut files = Vec::new();
    for dir in dirs {
        let mut builder = WalkBuilder::new(dir);
        // Only the rules single-file updates can also check: hidden entries
        // and `.gitignore` files at or below the workspace dir.
        builder
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .parents(false)
            .ignore(false)
            .git_global(false)
            .git_exclude(false);

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|t| t.is_file()) {
                        files.push(path_key(entry.path()));
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Local file system workspace rooted at one or more directories.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    dirs: Vec<PathBuf>,
}

impl FsWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dirs: vec![root.as_ref().to_path_buf()],
        }
    }

    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Absolute key for a path relative to the first workspace dir
    #[must_use]
    pub fn resolve(&self, relative: &str) -> String {
        match self.dirs.first() {
            Some(root) => path_key(&root.join(relative)),
            None => relative.to_string(),
        }
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn read_file(&self, path: &str) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    fn workspace_dirs(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }

    async fn modified_at(&self, path: &str) -> Option<i64> {
        let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
        let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
        i64::try_from(millis).ok()
    }

    fn watch(&self) -> Result<Option<RawEventStream>> {
        let (tx, rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate_event(&event) {
                        let _ = tx.blocking_send(change);
                    }
                }
                Err(err) => log::warn!("watch error: {err}"),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| IndexerError::Watcher(format!("watcher init failed: {e}")))?;

        for dir in &self.dirs {
            if let Err(err) = watcher.watch(dir, RecursiveMode::Recursive) {
                log::warn!("failed to watch {}: {err}", dir.display());
            }
        }

        Ok(Some(RawEventStream::new(rx, Some(Box::new(watcher)))))
    }
}

fn translate_event(event: &Event) -> Vec<FileChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        _ => return Vec::new(),
    };
    let timestamp_ms = now_ms();
    event
        .paths
        .iter()
        .filter(|p| kind == ChangeKind::Deleted || !p.is_dir())
        .map(|p| FileChangeEvent {
            kind,
            file_path: path_key(p),
            timestamp_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lists_files_respecting_gitignore() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".gitignore"), "generated.rs\n").unwrap();
        std::fs::write(root.join("src/lib.rs"), "fn a() {}").unwrap();
        std::fs::write(root.join("src/generated.rs"), "fn b() {}").unwrap();

        let workspace = FsWorkspace::new(root);
        let files = workspace.list_files().await.unwrap();
        assert_eq!(files, vec![workspace.resolve("src/lib.rs")]);

        let content = workspace.read_file(&files[0]).await.unwrap();
        assert_eq!(content, "fn a() {}");
        assert!(workspace.modified_at(&files[0]).await.is_some());
    }

    #[test]
    fn translates_notify_kinds() {
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/w/src/gone.rs"));
        let changes = translate_event(&event);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert_eq!(changes[0].file_path, "/w/src/gone.rs");

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any));
        assert!(translate_event(&access).is_empty());
    }
}
