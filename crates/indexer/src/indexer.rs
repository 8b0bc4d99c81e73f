use crate::admission::{is_gitignore, Admission};
use crate::error::{IndexerError, Result};
use crate::filter::{IgnoreFilter, DEFAULT_IGNORE_PATTERNS};
use crate::limits::default_index_concurrency;
use crate::metadata::{FileRecord, MetadataStore};
use crate::stats::{IndexStats, IndexingStatus};
use crate::workspace::{now_ms, Workspace};
use context_code_chunker::{Chunker, ChunkerConfig, CodeChunk};
use context_vector_store::{EmbeddingProvider, VectorStore};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Files indexed in parallel during a workspace pass
    pub concurrency: usize,
    /// Files matching these globs are never indexed
    pub ignore_patterns: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            concurrency: default_index_concurrency(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

/// What one `index_file` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Hash matched the stored record; nothing was written
    Unchanged,
    /// Chunks embedded and stored
    Indexed { chunks: usize },
    /// Embedding unavailable; chunks kept for lexical search only
    LexicalOnly { chunks: usize },
    /// No content to chunk
    Empty,
    /// Rejected by `is_indexable`; any old rows were dropped
    Excluded,
}

impl IndexOutcome {
    #[must_use]
    pub const fn chunks(self) -> usize {
        match self {
            Self::Indexed { chunks } | Self::LexicalOnly { chunks } => chunks,
            Self::Unchanged | Self::Empty | Self::Excluded => 0,
        }
    }
}

/// Hash-addressed indexer over a [`MetadataStore`] and a [`VectorStore`].
///
/// Calls for the same path are serialized; different paths run in parallel.
pub struct IncrementalIndexer {
    workspace: Arc<dyn Workspace>,
    metadata: Arc<MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Chunker,
    admission: Admission,
    concurrency: usize,
    ready: AtomicBool,
    path_locks: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
    progress: Mutex<PassProgress>,
}

impl IncrementalIndexer {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        metadata: Arc<MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunker)?;
        let dirs = workspace.workspace_dirs();
        let filter = IgnoreFilter::new(&config.ignore_patterns, dirs.clone())?;
        Ok(Self {
            workspace,
            metadata,
            vectors,
            embedder,
            chunker,
            admission: Admission::new(filter, dirs),
            concurrency: config.concurrency.max(1),
            ready: AtomicBool::new(false),
            path_locks: Mutex::new(HashMap::new()),
            progress: Mutex::new(PassProgress::default()),
        })
    }

    /// Open both stores. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.metadata.initialize().await?;
        self.vectors.initialize().await?;
        self.reconcile().await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Clear `indexed` on records whose vector rows were never flushed, so
    /// the next pass embeds those files again.
    async fn reconcile(&self) -> Result<()> {
        for mut record in self.metadata.get_indexed_files().await? {
            if self.vectors.count(Some(&record.file_path)).await? > 0 {
                continue;
            }
            log::info!("{} has no stored vectors; will re-embed", record.file_path);
            record.indexed = false;
            record.indexed_at_ms = None;
            self.metadata.save_metadata(record).await?;
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexerError::Uninitialized)
        }
    }

    /// Bring one file's index up to date with its current content.
    ///
    /// Files [`is_indexable`](Self::is_indexable) rejects are dropped from
    /// the index instead, so a single update never admits what a workspace
    /// pass would purge.
    pub async fn index_file(&self, file_path: &str) -> Result<IndexOutcome> {
        self.ensure_ready()?;
        if is_gitignore(file_path) {
            self.admission.forget_gitignores();
        }
        if !self.is_indexable(file_path).await {
            log::trace!("{file_path} is excluded from the index");
            self.remove_file_inner(file_path).await?;
            self.vectors.flush().await?;
            return Ok(IndexOutcome::Excluded);
        }

        let _pass = ProgressGuard::begin(&self.progress, 1);
        let outcome = self.index_file_inner(file_path).await;
        lock(&self.progress).complete(1);
        let outcome = outcome?;
        self.vectors.flush().await?;
        Ok(outcome)
    }

    async fn index_file_inner(&self, file_path: &str) -> Result<IndexOutcome> {
        let _lease = self.lock_path(file_path).await;

        let content = self
            .workspace
            .read_file(file_path)
            .await
            .map_err(|source| IndexerError::Read {
                path: file_path.to_string(),
                source,
            })?;
        let hash = content_hash(&content);
        let previous = self.metadata.get_metadata(file_path).await?;
        let same_hash = previous.as_ref().is_some_and(|r| r.content_hash == hash);

        if same_hash && previous.as_ref().is_some_and(|r| r.indexed) {
            log::trace!("{file_path} unchanged");
            return Ok(IndexOutcome::Unchanged);
        }
        if same_hash && self.embedder.is_none() {
            return Ok(IndexOutcome::Unchanged);
        }

        let chunks = self.chunker.chunk_str(&content, file_path);
        if same_hash && chunks.is_empty() {
            return Ok(IndexOutcome::Unchanged);
        }

        let last_modified_ms = self
            .workspace
            .modified_at(file_path)
            .await
            .unwrap_or_else(now_ms);
        let mut record = FileRecord {
            file_path: file_path.to_string(),
            content_hash: hash,
            last_modified_ms,
            indexed: false,
            indexed_at_ms: None,
        };

        if chunks.is_empty() {
            self.vectors.delete(file_path).await?;
            self.metadata.commit_file(record, Vec::new()).await?;
            log::debug!("{file_path} is empty; cleared its index rows");
            return Ok(IndexOutcome::Empty);
        }

        let count = chunks.len();
        let embedded = match &self.embedder {
            Some(embedder) => self.embed_chunks(embedder.as_ref(), file_path, &chunks).await,
            None => None,
        };

        // Vector rows land before the record that claims them.
        match embedded {
            Some(vectors) => {
                self.vectors
                    .add(file_path, chunks.clone(), vectors)
                    .await?;
                record.indexed = true;
                record.indexed_at_ms = Some(now_ms());
            }
            None => self.vectors.delete(file_path).await?,
        }
        let indexed = record.indexed;
        self.metadata.commit_file(record, chunks).await?;

        log::debug!("Indexed {file_path} ({count} chunks, embedded={indexed})");
        Ok(if indexed {
            IndexOutcome::Indexed { chunks: count }
        } else {
            IndexOutcome::LexicalOnly { chunks: count }
        })
    }

    async fn embed_chunks(
        &self,
        embedder: &dyn EmbeddingProvider,
        file_path: &str,
        chunks: &[CodeChunk],
    ) -> Option<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        match embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => Some(vectors),
            Ok(vectors) => {
                log::warn!(
                    "Embedding {file_path} returned {} vectors for {} chunks; keeping lexical index only",
                    vectors.len(),
                    texts.len()
                );
                None
            }
            Err(e) => {
                log::warn!("Embedding {file_path} failed, keeping lexical index only: {e}");
                None
            }
        }
    }

    /// Forget a file. Safe for paths that were never indexed.
    pub async fn remove_file(&self, file_path: &str) -> Result<()> {
        self.ensure_ready()?;
        self.remove_file_inner(file_path).await?;
        self.vectors.flush().await?;
        Ok(())
    }

    async fn remove_file_inner(&self, file_path: &str) -> Result<()> {
        let _lease = self.lock_path(file_path).await;
        // Record first so no reader sees `indexed` without rows.
        let existed = self.metadata.delete_metadata(file_path).await?;
        self.vectors.delete(file_path).await?;
        if existed {
            log::debug!("Removed {file_path} from index");
        }
        Ok(())
    }

    /// Index every workspace file with bounded concurrency, purge records
    /// of files that are gone or no longer indexable, then flush vectors.
    pub async fn index_workspace(self: &Arc<Self>) -> Result<IndexStats> {
        self.ensure_ready()?;
        let start = Instant::now();
        let mut stats = IndexStats::new();

        self.admission.forget_gitignores();
        let mut files = Vec::new();
        for file in self.workspace.list_files().await? {
            if self.is_indexable(&file).await {
                files.push(file);
            }
        }
        log::info!("Indexing {} workspace files", files.len());

        let _pass = ProgressGuard::begin(&self.progress, files.len());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for file in &files {
            let this = Arc::clone(self);
            let semaphore = semaphore.clone();
            let file = file.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = this.index_file_inner(&file).await;
                (file, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            lock(&self.progress).complete(1);
            match joined {
                Ok((_, Ok(IndexOutcome::Unchanged))) => stats.unchanged += 1,
                Ok((_, Ok(outcome))) => stats.add_file(outcome.chunks()),
                Ok((file, Err(e))) => {
                    log::warn!("Failed to index {file}: {e}");
                    stats.add_error(format!("{file}: {e}"));
                }
                Err(e) => stats.add_error(format!("Task panicked: {e}")),
            }
        }

        let present: HashSet<&str> = files.iter().map(String::as_str).collect();
        for known in self.metadata.known_files().await? {
            if present.contains(known.as_str()) {
                continue;
            }
            match self.remove_file_inner(&known).await {
                Ok(()) => stats.removed += 1,
                Err(e) => stats.add_error(format!("{known}: {e}")),
            }
        }

        if let Err(e) = self.vectors.flush().await {
            log::warn!("Failed to flush vectors: {e}");
            stats.add_error(format!("vector flush: {e}"));
        }

        stats.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Indexed {} files ({} chunks, {} unchanged, {} removed, {} errors) in {} ms",
            stats.files,
            stats.chunks,
            stats.unchanged,
            stats.removed,
            stats.errors.len(),
            stats.time_ms
        );
        Ok(stats)
    }

    pub async fn get_status(&self) -> Result<IndexingStatus> {
        self.ensure_ready()?;
        let (total, indexed) = self.metadata.file_counts().await?;
        let mut progress = lock(&self.progress);
        Ok(IndexingStatus {
            is_indexing: progress.in_flight > 0,
            files_indexed: indexed,
            total_files: total.max(progress.planned),
            progress: progress.fraction(),
        })
    }

    /// Whether `file_path` belongs in the index. Workspace passes and
    /// single-file updates both go through this check.
    pub async fn is_indexable(&self, file_path: &str) -> bool {
        self.admission
            .admits(self.workspace.as_ref(), file_path)
            .await
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    /// Close both stores; later calls fail with `Uninitialized`.
    pub async fn dispose(&self) -> Result<()> {
        if !self.ready.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.metadata.dispose().await?;
        self.vectors.dispose().await?;
        Ok(())
    }

    async fn lock_path(&self, file_path: &str) -> PathLease<'_> {
        let slot = lock(&self.path_locks)
            .entry(file_path.to_string())
            .or_default()
            .clone();
        let guard = slot.lock_owned().await;
        PathLease {
            locks: &self.path_locks,
            key: file_path.to_string(),
            guard: Some(guard),
        }
    }
}

/// Hex SHA-256 of file content
#[must_use]
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive hold on one path; drops the map entry once nobody else waits.
struct PathLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock(self.locks);
        if locks
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[derive(Debug, Default)]
struct PassProgress {
    in_flight: usize,
    planned: usize,
    completed: usize,
    reported: f32,
}

impl PassProgress {
    fn begin(&mut self, planned: usize) {
        if self.in_flight == 0 {
            *self = Self::default();
        }
        self.in_flight += 1;
        self.planned += planned;
    }

    fn complete(&mut self, files: usize) {
        self.completed += files;
    }

    fn end(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn fraction(&mut self) -> f32 {
        if self.in_flight == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let raw = if self.planned == 0 {
            0.0
        } else {
            (self.completed as f32 / self.planned as f32).min(1.0)
        };
        self.reported = self.reported.max(raw);
        self.reported
    }
}

struct ProgressGuard<'a> {
    progress: &'a Mutex<PassProgress>,
}

impl<'a> ProgressGuard<'a> {
    fn begin(progress: &'a Mutex<PassProgress>, planned: usize) -> Self {
        lock(progress).begin(planned);
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        lock(self.progress).end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn progress_is_monotonic_within_a_pass() {
        let mut progress = PassProgress::default();
        assert_eq!(progress.fraction(), 1.0);

        progress.begin(4);
        progress.complete(2);
        assert_eq!(progress.fraction(), 0.5);

        // A second caller joins and grows the plan; reported value holds.
        progress.begin(4);
        assert_eq!(progress.fraction(), 0.5);
        progress.complete(4);
        assert_eq!(progress.fraction(), 0.75);

        progress.end();
        progress.end();
        assert_eq!(progress.fraction(), 1.0);

        progress.begin(2);
        assert_eq!(progress.fraction(), 0.0);
    }
}
