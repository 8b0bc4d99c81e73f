//! Which workspace files belong in the index.

use crate::filter::IgnoreFilter;
use crate::workspace::{path_key, Workspace};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const GITIGNORE: &str = ".gitignore";

/// One predicate for workspace passes and single-file updates alike.
///
/// Ignore globs apply first. Below the workspace dir, any component starting
/// with `.` excludes the file. Otherwise the nearest `.gitignore` with an
/// opinion decides, so `!keep.tmp` in a subdirectory overrides `*.tmp` at the
/// root.
pub(crate) struct Admission {
    filter: IgnoreFilter,
    roots: Vec<PathBuf>,
    /// Parsed `.gitignore` per directory; `None` when absent or empty
    gitignores: Mutex<HashMap<PathBuf, Option<Arc<Gitignore>>>>,
}

impl Admission {
    pub(crate) fn new(filter: IgnoreFilter, roots: Vec<PathBuf>) -> Self {
        Self {
            filter,
            roots,
            gitignores: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn admits(&self, workspace: &dyn Workspace, file_path: &str) -> bool {
        if self.filter.is_ignored(file_path) {
            return false;
        }
        let path = Path::new(file_path);
        let Some(root) = self.root_of(path) else {
            return true;
        };
        let Ok(relative) = path.strip_prefix(root) else {
            return true;
        };
        if relative.components().any(is_hidden) {
            return false;
        }

        let dirs: Vec<&Path> = path
            .ancestors()
            .skip(1)
            .take_while(|dir| dir.starts_with(root))
            .collect();
        for dir in dirs {
            let Some(gitignore) = self.gitignore(workspace, dir).await else {
                continue;
            };
            match gitignore.matched_path_or_any_parents(path, false) {
                Match::Ignore(_) => return false,
                Match::Whitelist(_) => return true,
                Match::None => {}
            }
        }
        true
    }

    /// Drop parsed `.gitignore` files so the next check rereads them.
    pub(crate) fn forget_gitignores(&self) {
        self.gitignores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn root_of(&self, path: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    async fn gitignore(&self, workspace: &dyn Workspace, dir: &Path) -> Option<Arc<Gitignore>> {
        if let Some(cached) = self
            .gitignores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dir)
        {
            return cached.clone();
        }

        let source = path_key(&dir.join(GITIGNORE));
        let parsed = match workspace.read_file(&source).await {
            Ok(content) => parse_gitignore(dir, &source, &content),
            Err(_) => None,
        };
        self.gitignores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir.to_path_buf(), parsed.clone());
        parsed
    }
}

pub(crate) fn is_gitignore(file_path: &str) -> bool {
    Path::new(file_path)
        .file_name()
        .is_some_and(|name| name == GITIGNORE)
}

fn is_hidden(component: Component<'_>) -> bool {
    matches!(component, Component::Normal(name) if name.to_string_lossy().starts_with('.'))
}

fn parse_gitignore(dir: &Path, source: &str, content: &str) -> Option<Arc<Gitignore>> {
    let mut builder = GitignoreBuilder::new(dir);
    for line in content.lines() {
        if let Err(e) = builder.add_line(None, line) {
            log::warn!("Skipping line {line:?} in {source}: {e}");
        }
    }
    match builder.build() {
        Ok(gitignore) if gitignore.is_empty() => None,
        Ok(gitignore) => Some(Arc::new(gitignore)),
        Err(e) => {
            log::warn!("Ignoring unreadable {source}: {e}");
            None
        }
    }
}
