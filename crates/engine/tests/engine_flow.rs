use async_trait::async_trait;
use context_code_chunker::{ChunkerConfig, CodeChunk};
use context_engine::{
    ContextEngine, ContextQuery, EngineConfig, EngineError, Lifecycle, METADATA_FILE,
    VECTORS_FILE,
};
use context_indexer::{ChangeKind, FileChangeEvent, Workspace};
use context_search::{Intent, Retriever, RetrieverKind, SearchError};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MemoryWorkspace {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryWorkspace {
    fn write(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    async fn read_file(&self, path: &str) -> std::io::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }

    fn workspace_dirs(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("/ws")]
    }

    async fn list_files(&self) -> std::io::Result<Vec<String>> {
        let mut files: Vec<_> = self.files.lock().unwrap().keys().cloned().collect();
        files.sort();
        Ok(files)
    }
}

struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn retrieve(&self, _query: &str, _limit: usize) -> context_search::Result<Vec<CodeChunk>> {
        Err(SearchError::Retriever {
            name: "failing".into(),
            message: "backend offline".into(),
        })
    }
}

struct StalledRetriever;

#[async_trait]
impl Retriever for StalledRetriever {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn retrieve(&self, _query: &str, _limit: usize) -> context_search::Result<Vec<CodeChunk>> {
        std::future::pending().await
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.index_on_startup = false;
    config.index_concurrency = 2;
    config.watcher.debounce_ms = 20;
    config
}

fn engine_with(workspace: Arc<MemoryWorkspace>, config: EngineConfig) -> ContextEngine {
    ContextEngine::new(config, workspace).unwrap()
}

async fn ready_engine(workspace: Arc<MemoryWorkspace>) -> ContextEngine {
    let engine = engine_with(workspace, test_config());
    engine.initialize().await.unwrap();
    engine
}

#[tokio::test]
async fn lifecycle_guards_every_entry_point() {
    let engine = engine_with(Arc::new(MemoryWorkspace::default()), test_config());
    assert_eq!(engine.lifecycle(), Lifecycle::Uninitialized);
    assert!(matches!(
        engine.query(ContextQuery::new("explain", 10)).await,
        Err(EngineError::NotInitialized)
    ));
    assert!(matches!(engine.status().await, Err(EngineError::NotInitialized)));

    engine.initialize().await.unwrap();
    engine.initialize().await.unwrap();
    assert_eq!(engine.lifecycle(), Lifecycle::Ready);

    engine.dispose().await.unwrap();
    engine.dispose().await.unwrap();
    assert_eq!(engine.lifecycle(), Lifecycle::Disposed);
    assert!(matches!(
        engine.query(ContextQuery::new("explain", 10)).await,
        Err(EngineError::Disposed)
    ));
    assert!(matches!(engine.initialize().await, Err(EngineError::Disposed)));
}

#[tokio::test]
async fn zero_budget_is_rejected() {
    let engine = ready_engine(Arc::new(MemoryWorkspace::default())).await;
    assert!(matches!(
        engine.query(ContextQuery::new("explain the parser", 0)).await,
        Err(EngineError::InvalidBudget)
    ));
}

#[tokio::test]
async fn empty_index_is_an_empty_success() {
    let engine = ready_engine(Arc::new(MemoryWorkspace::default())).await;
    let result = engine
        .query(ContextQuery::new("explain the parser", 500))
        .await
        .unwrap();

    assert!(result.items.is_empty());
    assert_eq!(result.tokens_used, 0);
    assert_eq!(result.intent, Intent::Explain);
    assert_eq!(result.retrieval_methods, vec!["semantic", "lexical"]);
}

#[tokio::test]
async fn oversized_chunk_never_fits_a_tiny_budget() {
    let workspace = Arc::new(MemoryWorkspace::default());
    // 1000 estimated tokens in a single chunk
    let body = "fn parse_value() {}\n".repeat(200);
    workspace.write("/ws/src/big.rs", &body);

    let mut config = test_config();
    config.chunker = ChunkerConfig::whole_file();
    let engine = engine_with(workspace, config);
    engine.initialize().await.unwrap();
    engine.index_workspace().await.unwrap();

    let tiny = engine
        .query(ContextQuery::new("explain parse_value", 1))
        .await
        .unwrap();
    assert!(tiny.items.is_empty());
    assert_eq!(tiny.tokens_used, 0);

    let roomy = engine
        .query(ContextQuery::new("explain parse_value", 5000))
        .await
        .unwrap();
    assert_eq!(roomy.items.len(), 1);
    assert_eq!(roomy.tokens_used, 1000);
    assert_eq!(roomy.items[0].content, body);
}

#[tokio::test]
async fn intent_selects_the_retrieval_plan() {
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/src/error.rs", "fn report_error(code: u32) {}\n");
    let engine = ready_engine(workspace).await;
    engine.index_workspace().await.unwrap();

    let classified = engine
        .query(ContextQuery::new("fix this error", 500))
        .await
        .unwrap();
    assert_eq!(classified.intent, Intent::BugFix);
    assert_eq!(
        classified.retrieval_methods,
        vec!["recency", "lexical", "semantic"]
    );
    assert_eq!(classified.items[0].file_path, "/ws/src/error.rs");

    let forced = engine
        .query(ContextQuery::new("fix this error", 500).with_intent(Intent::Test))
        .await
        .unwrap();
    assert_eq!(forced.intent, Intent::Test);
    assert_eq!(forced.retrieval_methods, vec!["lexical", "semantic"]);
}

#[tokio::test]
async fn active_file_breaks_ties() {
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/a.rs", "fn shared_helper() {}\n");
    workspace.write("/ws/b.rs", "fn shared_helper() {}\n");
    let engine = ready_engine(workspace).await;
    engine.index_workspace().await.unwrap();

    let plain = engine
        .query(ContextQuery::new("shared_helper", 500).with_intent(Intent::Test))
        .await
        .unwrap();
    assert_eq!(plain.items[0].file_path, "/ws/a.rs");

    let focused = engine
        .query(
            ContextQuery::new("shared_helper", 500)
                .with_intent(Intent::Test)
                .with_active_file("/ws/b.rs"),
        )
        .await
        .unwrap();
    assert_eq!(focused.items[0].file_path, "/ws/b.rs");
}

#[tokio::test]
async fn failing_retriever_is_isolated() {
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/src/lib.rs", "fn load_settings() {}\n");
    let engine = engine_with(workspace, test_config())
        .with_retriever(RetrieverKind::Semantic, Arc::new(FailingRetriever));
    engine.initialize().await.unwrap();
    engine.index_workspace().await.unwrap();

    let result = engine
        .query(ContextQuery::new("explain load_settings", 500))
        .await
        .unwrap();
    assert_eq!(result.retrieval_methods, vec!["lexical"]);
    assert_eq!(result.items.len(), 1);
}

#[tokio::test]
async fn query_fails_when_every_retriever_fails() {
    let engine = engine_with(Arc::new(MemoryWorkspace::default()), test_config())
        .with_retriever(RetrieverKind::Semantic, Arc::new(FailingRetriever))
        .with_retriever(RetrieverKind::Lexical, Arc::new(FailingRetriever));
    engine.initialize().await.unwrap();

    let err = engine
        .query(ContextQuery::new("explain", 500))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AllRetrieversFailed(_)));
}

#[tokio::test]
async fn cancellation_returns_no_partial_result() {
    let engine = engine_with(Arc::new(MemoryWorkspace::default()), test_config())
        .with_retriever(RetrieverKind::Semantic, Arc::new(StalledRetriever));
    engine.initialize().await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = engine
        .query_with_cancel(ContextQuery::new("explain", 500), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let already = CancellationToken::new();
    already.cancel();
    assert!(matches!(
        engine
            .query_with_cancel(ContextQuery::new("explain", 500), already)
            .await,
        Err(EngineError::Cancelled)
    ));
}

#[tokio::test]
async fn without_embedder_skips_semantic_retrieval() {
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/src/lib.rs", "fn render_frame() {}\n");
    let engine = engine_with(workspace, test_config()).without_embedder();
    engine.initialize().await.unwrap();
    engine.index_workspace().await.unwrap();

    let result = engine
        .query(ContextQuery::new("explain render_frame", 500))
        .await
        .unwrap();
    assert_eq!(result.retrieval_methods, vec!["lexical"]);
    assert_eq!(result.items.len(), 1);
}

#[tokio::test]
async fn watcher_events_reach_the_index() {
    let workspace = Arc::new(MemoryWorkspace::default());
    let engine = ready_engine(workspace.clone()).await;

    workspace.write("/ws/src/new.rs", "fn freshly_written() {}\n");
    engine
        .simulate_change(FileChangeEvent::new(ChangeKind::Created, "/ws/src/new.rs"))
        .unwrap();
    engine
        .simulate_change(FileChangeEvent::new(ChangeKind::Created, "/ws/node_modules/x.js"))
        .unwrap();

    let mut found = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        found = engine
            .query(ContextQuery::new("freshly_written", 500).with_intent(Intent::Test))
            .await
            .unwrap()
            .items;
        if !found.is_empty() {
            break;
        }
    }
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].file_path, "/ws/src/new.rs");

    let status = engine.status().await.unwrap();
    assert_eq!(status.files_indexed, 1);
    assert!(!status.is_indexing);

    engine
        .simulate_change(FileChangeEvent::new(ChangeKind::Deleted, "/ws/src/new.rs"))
        .unwrap();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if engine.status().await.unwrap().files_indexed == 0 {
            break;
        }
    }
    assert_eq!(engine.status().await.unwrap().files_indexed, 0);
}

#[tokio::test]
async fn watcher_events_respect_gitignore_and_hidden_files() {
    let workspace = Arc::new(MemoryWorkspace::default());
    let engine = ready_engine(workspace.clone()).await;

    workspace.write("/ws/.gitignore", "secret.rs\n");
    workspace.write("/ws/.env", "API_TOKEN=hunter2\n");
    workspace.write("/ws/secret.rs", "const PASSWORD: &str = \"hunter2\";\n");
    workspace.write("/ws/src/app.rs", "fn visible_marker() {}\n");
    for path in ["/ws/secret.rs", "/ws/.env", "/ws/src/app.rs"] {
        engine
            .simulate_change(FileChangeEvent::new(ChangeKind::Modified, path))
            .unwrap();
    }

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if engine.status().await.unwrap().files_indexed == 1 {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = engine
        .query(ContextQuery::new("hunter2", 500).with_intent(Intent::Test))
        .await
        .unwrap();
    let paths: Vec<&str> = result.items.iter().map(|c| c.file_path.as_str()).collect();
    assert_eq!(paths, vec!["/ws/src/app.rs"]);

    let stats = engine.index_workspace().await.unwrap();
    assert_eq!((stats.unchanged, stats.removed), (1, 0));
}

#[tokio::test]
async fn persistent_index_survives_restart() {
    let storage = TempDir::new().unwrap();
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/src/db.rs", "fn open_connection() {}\n");

    let mut config = test_config();
    config.storage_dir = Some(storage.path().to_path_buf());

    let first = engine_with(workspace.clone(), config.clone());
    first.initialize().await.unwrap();
    let stats = first.index_workspace().await.unwrap();
    assert_eq!(stats.files, 1);
    first.dispose().await.unwrap();

    assert!(storage.path().join(METADATA_FILE).exists());
    assert!(storage.path().join(VECTORS_FILE).exists());

    let second = engine_with(workspace, config);
    second.initialize().await.unwrap();
    let result = second
        .query(ContextQuery::new("explain open_connection", 500))
        .await
        .unwrap();
    assert_eq!(result.items.len(), 1);

    let again = second.index_workspace().await.unwrap();
    assert_eq!(again.files, 0);
    assert_eq!(again.unchanged, 1);
    second.dispose().await.unwrap();
}

#[tokio::test]
async fn startup_pass_runs_in_background() {
    let workspace = Arc::new(MemoryWorkspace::default());
    workspace.write("/ws/src/main.rs", "fn boot_sequence() {}\n");

    let mut config = test_config();
    config.index_on_startup = true;
    let engine = engine_with(workspace, config);
    engine.initialize().await.unwrap();

    for _ in 0..100 {
        if engine.status().await.unwrap().files_indexed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(engine.status().await.unwrap().files_indexed, 1);
    engine.dispose().await.unwrap();
}
