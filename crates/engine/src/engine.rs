use crate::config::{EngineConfig, TokenizerKind};
use crate::error::{EngineError, Result};
use context_code_chunker::CodeChunk;
use context_indexer::{
    ChangeKind, FileChangeEvent, FileWatcher, FileWatcherConfig, IncrementalIndexer, IndexStats,
    IndexerConfig, IndexingStatus, MetadataStore, Workspace,
};
use context_search::{
    retrieval_plan, BpeTokenizer, BudgetPacker, EstimatingTokenizer, Intent, IntentClassifier,
    LexicalRetriever, Ranker, RecencyRetriever, Retriever, RetrieverKind, ScoreRanker,
    SemanticRetriever, Tokenizer,
};
use context_vector_store::{
    CachedEmbedder, EmbeddingProvider, FlatVectorStore, HashingEmbedder, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A request for code context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub input: String,

    /// Skips classification when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,

    /// File open in the editor; its chunks get a score boost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_file: Option<String>,

    /// Selected text, appended to the retrieval query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,

    /// Must be greater than zero
    pub token_budget: usize,
}

impl ContextQuery {
    pub fn new(input: impl Into<String>, token_budget: usize) -> Self {
        Self {
            input: input.into(),
            intent: None,
            active_file: None,
            selection: None,
            token_budget,
        }
    }

    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    #[must_use]
    pub fn with_active_file(mut self, path: impl Into<String>) -> Self {
        self.active_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    fn retrieval_text(&self) -> String {
        match self.selection.as_deref().map(str::trim) {
            Some(selection) if !selection.is_empty() => format!("{}\n{selection}", self.input),
            _ => self.input.clone(),
        }
    }
}

/// Ranked chunks that fit the query's token budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub items: Vec<CodeChunk>,
    pub intent: Intent,
    /// Never exceeds the query's `token_budget`
    pub tokens_used: usize,
    /// Retrievers that completed without error, in plan order
    pub retrieval_methods: Vec<String>,
}

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

enum EngineState {
    Uninitialized,
    Initializing,
    Ready(Arc<Components>),
    Disposed,
}

struct Components {
    indexer: Arc<IncrementalIndexer>,
    watcher: FileWatcher,
    retrievers: HashMap<RetrieverKind, Arc<dyn Retriever>>,
    background: Background,
}

/// Index work spawned by the watcher and the startup pass
#[derive(Clone)]
struct Background {
    shutdown: CancellationToken,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Background {
    fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let shutdown = self.shutdown.clone();
        let mut tasks = lock(&self.tasks);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = task => {}
            }
        });
    }

    /// Cancel outstanding work and wait for it to unwind.
    async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));
        while tasks.join_next().await.is_some() {}
    }
}

/// Orchestrates indexing and retrieval over one workspace.
///
/// ```text
/// Uninitialized ──initialize──> Initializing ──> Ready ──dispose──> Disposed
/// ```
///
/// A disposed engine cannot be restarted; build a new one instead.
pub struct ContextEngine {
    config: EngineConfig,
    workspace: Arc<dyn Workspace>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retriever_overrides: HashMap<RetrieverKind, Arc<dyn Retriever>>,
    classifier: IntentClassifier,
    ranker: Arc<dyn Ranker>,
    packer: BudgetPacker,
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<EngineState>,
}

impl ContextEngine {
    /// Validates `config` and prepares the collaborators. Nothing is opened
    /// until [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig, workspace: Arc<dyn Workspace>) -> Result<Self> {
        config.validate()?;
        let tokenizer: Arc<dyn Tokenizer> = match config.tokenizer {
            TokenizerKind::Estimate => Arc::new(EstimatingTokenizer),
            TokenizerKind::Cl100k => Arc::new(BpeTokenizer::cl100k()?),
        };
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashingEmbedder::new(config.embedding.dimension));

        Ok(Self {
            classifier: IntentClassifier::new(config.classifier),
            config,
            workspace,
            embedder: Some(embedder),
            retriever_overrides: HashMap::new(),
            ranker: Arc::new(ScoreRanker),
            packer: BudgetPacker::new(tokenizer),
            lifecycle: tokio::sync::Mutex::new(()),
            state: Mutex::new(EngineState::Uninitialized),
        })
    }

    /// Replace the built-in hashing embedder.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run without embeddings: files are indexed for lexical search only and
    /// the semantic retriever is skipped.
    #[must_use]
    pub fn without_embedder(mut self) -> Self {
        self.embedder = None;
        self
    }

    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.packer = BudgetPacker::new(tokenizer);
        self
    }

    #[must_use]
    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = ranker;
        self
    }

    /// Use `retriever` wherever a plan asks for `kind`.
    #[must_use]
    pub fn with_retriever(mut self, kind: RetrieverKind, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever_overrides.insert(kind, retriever);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &*self.lock_state() {
            EngineState::Uninitialized => Lifecycle::Uninitialized,
            EngineState::Initializing => Lifecycle::Initializing,
            EngineState::Ready(_) => Lifecycle::Ready,
            EngineState::Disposed => Lifecycle::Disposed,
        }
    }

    /// Open the stores, wire the file watcher to the indexer and, when
    /// configured, start a background workspace pass. No-op when ready.
    pub async fn initialize(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        match &*self.lock_state() {
            EngineState::Ready(_) => return Ok(()),
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => {}
        }

        *self.lock_state() = EngineState::Initializing;
        match self.build().await {
            Ok(components) => {
                *self.lock_state() = EngineState::Ready(Arc::new(components));
                log::info!(
                    "Context engine ready ({} workspace dirs)",
                    self.workspace.workspace_dirs().len()
                );
                Ok(())
            }
            Err(e) => {
                *self.lock_state() = EngineState::Uninitialized;
                log::error!("Context engine failed to initialize: {e}");
                Err(e)
            }
        }
    }

    async fn build(&self) -> Result<Components> {
        if let Some(dir) = &self.config.storage_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let metadata = Arc::new(match self.config.metadata_path() {
            Some(path) => MetadataStore::persistent(path),
            None => MetadataStore::in_memory(),
        });
        let vectors: Arc<dyn VectorStore> = Arc::new(match self.config.vectors_path() {
            Some(path) => FlatVectorStore::persistent(path),
            None => FlatVectorStore::in_memory(),
        });
        let embedder: Option<Arc<dyn EmbeddingProvider>> = self.embedder.as_ref().map(|inner| {
            Arc::new(CachedEmbedder::new(
                Arc::clone(inner),
                self.config.embedding.batch_size,
                self.config.embedding.cache_capacity,
            )) as Arc<dyn EmbeddingProvider>
        });

        let watcher = FileWatcher::new(FileWatcherConfig {
            debounce: self.config.watcher.debounce(),
            ignore_patterns: self.config.watcher.ignore_patterns.clone(),
            base_dirs: self.workspace.workspace_dirs(),
        })?;
        let indexer = Arc::new(IncrementalIndexer::new(
            Arc::clone(&self.workspace),
            Arc::clone(&metadata),
            Arc::clone(&vectors),
            embedder.clone(),
            IndexerConfig {
                chunker: self.config.chunker.clone(),
                concurrency: self.config.index_concurrency,
                ignore_patterns: self.config.watcher.ignore_patterns.clone(),
            },
        )?);
        indexer.initialize().await?;

        let mut retrievers: HashMap<RetrieverKind, Arc<dyn Retriever>> = HashMap::new();
        if let Some(embedder) = embedder {
            retrievers.insert(
                RetrieverKind::Semantic,
                Arc::new(SemanticRetriever::new(embedder, vectors)),
            );
        }
        retrievers.insert(
            RetrieverKind::Lexical,
            Arc::new(LexicalRetriever::new(Arc::clone(&metadata))),
        );
        retrievers.insert(
            RetrieverKind::Recency,
            Arc::new(RecencyRetriever::new(
                metadata,
                self.config.retrieval.recency_window(),
            )),
        );
        retrievers.extend(
            self.retriever_overrides
                .iter()
                .map(|(kind, retriever)| (*kind, Arc::clone(retriever))),
        );

        let background = Background::new();
        {
            let indexer = Arc::clone(&indexer);
            let background = background.clone();
            watcher.on_change(move |event| {
                let indexer = Arc::clone(&indexer);
                background.spawn(async move { apply_change(&indexer, event).await });
            });
        }

        match self.workspace.watch() {
            Ok(Some(source)) => watcher.start_with_source(source),
            Ok(None) => watcher.start(),
            Err(e) => {
                log::warn!("Native file watching unavailable, relying on injected events: {e}");
                watcher.start();
            }
        }

        if self.config.index_on_startup {
            let indexer = Arc::clone(&indexer);
            background.spawn(async move {
                if let Err(e) = indexer.index_workspace().await {
                    log::warn!("Startup indexing failed: {e}");
                }
            });
        }

        Ok(Components {
            indexer,
            watcher,
            retrievers,
            background,
        })
    }

    /// [`query_with_cancel`](Self::query_with_cancel) without a cancellation
    /// signal.
    pub async fn query(&self, query: ContextQuery) -> Result<ContextResult> {
        self.query_with_cancel(query, CancellationToken::new()).await
    }

    /// Classify, retrieve concurrently, rank and pack.
    ///
    /// A failing retriever is logged and skipped; the query fails only when
    /// every planned retriever failed. Cancellation abandons in-flight
    /// retrievers and returns [`EngineError::Cancelled`], never a partial
    /// result.
    pub async fn query_with_cancel(
        &self,
        query: ContextQuery,
        cancel: CancellationToken,
    ) -> Result<ContextResult> {
        let components = self.components()?;
        if query.token_budget == 0 {
            return Err(EngineError::InvalidBudget);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let intent = query
            .intent
            .unwrap_or_else(|| self.classifier.classify(&query.input).intent);
        let text = query.retrieval_text();
        let limit = self.config.retrieval.candidates_per_retriever;

        let mut tasks = JoinSet::new();
        for (position, entry) in retrieval_plan(intent).iter().enumerate() {
            let Some(retriever) = components.retrievers.get(&entry.kind) else {
                log::debug!("No {} retriever configured, skipping", entry.kind);
                continue;
            };
            let retriever = Arc::clone(retriever);
            let text = text.clone();
            let weight = entry.weight;
            tasks.spawn(async move {
                let outcome = retriever.retrieve(&text, limit).await;
                RetrieverRun {
                    position,
                    name: retriever.name(),
                    weight,
                    outcome,
                }
            });
        }
        let planned = tasks.len();

        let mut runs = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                log::debug!("Query cancelled with {planned} retrievers in flight");
                return Err(EngineError::Cancelled);
            }
            runs = join_runs(tasks) => runs,
        };
        runs.sort_by_key(|run| run.position);

        let boost = self.config.retrieval.active_file_boost;
        let active_file = query.active_file.as_deref();
        let mut candidates = Vec::new();
        let mut methods = Vec::new();
        let mut failures = Vec::new();
        for run in runs {
            match run.outcome {
                Ok(chunks) => {
                    methods.push(run.name.to_string());
                    candidates.extend(
                        chunks
                            .into_iter()
                            .map(|chunk| weigh(chunk, run.weight, active_file, boost)),
                    );
                }
                Err(e) => {
                    log::warn!("Retriever {} failed: {e}", run.name);
                    failures.push(format!("{}: {e}", run.name));
                }
            }
        }
        if planned > 0 && methods.is_empty() {
            return Err(EngineError::AllRetrieversFailed(failures.join("; ")));
        }

        let ranked = self.ranker.rank(candidates, &query.input);
        let packed = self.packer.pack(ranked, query.token_budget);
        log::debug!(
            "Query {:?} ({intent}): {} chunks, {}/{} tokens via [{}]",
            query.input,
            packed.items.len(),
            packed.tokens_used,
            query.token_budget,
            methods.join(", ")
        );

        Ok(ContextResult {
            items: packed.items,
            intent,
            tokens_used: packed.tokens_used,
            retrieval_methods: methods,
        })
    }

    /// Index every workspace file now and wait for the pass to finish.
    pub async fn index_workspace(&self) -> Result<IndexStats> {
        let components = self.components()?;
        Ok(components.indexer.index_workspace().await?)
    }

    pub async fn status(&self) -> Result<IndexingStatus> {
        let components = self.components()?;
        Ok(components.indexer.get_status().await?)
    }

    /// Feed a raw change event through the watcher's filter and debounce.
    pub fn simulate_change(&self, event: FileChangeEvent) -> Result<()> {
        self.components()?.watcher.simulate_change(event);
        Ok(())
    }

    /// Stop watching, wait for background indexing to unwind and close the
    /// stores. Idempotent.
    pub async fn dispose(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *self.lock_state(), EngineState::Disposed);
        let EngineState::Ready(components) = previous else {
            return Ok(());
        };

        components.watcher.dispose();
        components.background.shutdown().await;
        components.indexer.dispose().await?;
        log::info!("Context engine disposed");
        Ok(())
    }

    fn components(&self) -> Result<Arc<Components>> {
        match &*self.lock_state() {
            EngineState::Ready(components) => Ok(Arc::clone(components)),
            EngineState::Disposed => Err(EngineError::Disposed),
            EngineState::Uninitialized | EngineState::Initializing => {
                Err(EngineError::NotInitialized)
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }
}

struct RetrieverRun {
    position: usize,
    name: &'static str,
    weight: f32,
    outcome: context_search::Result<Vec<CodeChunk>>,
}

async fn join_runs(mut tasks: JoinSet<RetrieverRun>) -> Vec<RetrieverRun> {
    let mut runs = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(run) => runs.push(run),
            Err(e) => log::warn!("Retriever task aborted: {e}"),
        }
    }
    runs
}

fn weigh(chunk: CodeChunk, weight: f32, active_file: Option<&str>, boost: f32) -> CodeChunk {
    let mut score = chunk.score_or_zero() * weight;
    if active_file == Some(chunk.file_path.as_str()) {
        score *= boost;
    }
    chunk.with_score(score)
}

async fn apply_change(indexer: &IncrementalIndexer, event: FileChangeEvent) {
    let path = event.file_path.as_str();
    let result = match event.kind {
        ChangeKind::Created | ChangeKind::Modified => indexer
            .index_file(path)
            .await
            .map(|outcome| log::debug!("{} {path}: {outcome:?}", event.kind)),
        ChangeKind::Deleted => indexer.remove_file(path).await,
    };
    if let Err(e) = result {
        log::warn!("Failed to apply {} event for {path}: {e}", event.kind);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, score: f32) -> CodeChunk {
        CodeChunk::new(path.to_string(), 1, 2, String::new()).with_score(score)
    }

    #[test]
    fn selection_is_appended_to_retrieval_text() {
        let query = ContextQuery::new("why does this panic", 100).with_selection("  x.unwrap()  ");
        assert_eq!(query.retrieval_text(), "why does this panic\nx.unwrap()");

        let blank = ContextQuery::new("why", 100).with_selection("   ");
        assert_eq!(blank.retrieval_text(), "why");
    }

    #[test]
    fn weights_and_active_file_boost_multiply() {
        let weighted = weigh(chunk("a.rs", 0.5), 0.8, Some("b.rs"), 2.0);
        assert!((weighted.score_or_zero() - 0.4).abs() < 1e-6);

        let boosted = weigh(chunk("a.rs", 0.5), 0.8, Some("a.rs"), 2.0);
        assert!((boosted.score_or_zero() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn query_serializes_without_empty_options() {
        let json = serde_json::to_value(ContextQuery::new("explain", 10)).unwrap();
        assert_eq!(json, serde_json::json!({ "input": "explain", "token_budget": 10 }));
    }
}
