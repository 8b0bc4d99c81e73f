use crate::embeddings::cosine_similarity;
use crate::error::{Result, VectorStoreError};
use crate::types::{SearchResult, StoredChunk};
use async_trait::async_trait;
use context_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Persists `(chunk, vector)` rows keyed by file path.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open the store. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Replace every chunk of `file_path` with `chunks`.
    ///
    /// `chunks` and `embeddings` must have equal lengths and every chunk must
    /// belong to `file_path`. An empty set deletes the file's rows.
    async fn add(&self, file_path: &str, chunks: Vec<CodeChunk>, embeddings: Vec<Vec<f32>>)
        -> Result<()>;

    /// Remove every chunk for `file_path`. No-op for unknown paths.
    async fn delete(&self, file_path: &str) -> Result<()>;

    /// Nearest chunks to `query`, best first, scores in `[0, 1]`.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored chunks, optionally restricted to one file
    async fn count(&self, file_path: Option<&str>) -> Result<usize>;

    /// Write pending mutations to durable storage, if the store has any.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Flush, then close. Later calls fail with `Uninitialized`.
    async fn dispose(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Table {
    dimension: usize,
    rows: BTreeMap<String, Vec<StoredChunk>>,
}

#[derive(Debug)]
enum State {
    Closed,
    /// `None` until the first non-empty `add` materializes the table
    Open(Option<Table>),
}

/// Brute-force cosine store, in memory or persisted as a JSON file.
///
/// Mutations stay in memory until [`VectorStore::flush`] or
/// [`VectorStore::dispose`] rewrites the file.
pub struct FlatVectorStore {
    path: Option<PathBuf>,
    state: RwLock<State>,
    /// Set under the state write lock after every mutation
    dirty: AtomicBool,
    /// Serializes snapshot writes so an older table never replaces a newer one
    flush_lock: Mutex<()>,
}

impl FlatVectorStore {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    pub fn persistent(path: impl AsRef<Path>) -> Self {
        Self::with_path(Some(path.as_ref().to_path_buf()))
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            state: RwLock::new(State::Closed),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn load(&self) -> Result<Option<Table>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(data) => {
                let table: Table = serde_json::from_str(&data)?;
                log::info!(
                    "Loaded {} vector rows for {} files from {}",
                    table.rows.values().map(Vec::len).sum::<usize>(),
                    table.rows.len(),
                    path.display()
                );
                Ok(Some(table))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Serialize under the read lock, then write outside it so searches are
    /// not blocked on disk IO.
    async fn write_snapshot(&self, path: &Path) -> Result<()> {
        let data = {
            let state = self.state.read().await;
            match &*state {
                State::Closed => return Err(VectorStoreError::Uninitialized),
                State::Open(None) => return Ok(()),
                State::Open(Some(table)) => serde_json::to_vec(table)?,
            }
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::debug!("Flushed {} bytes of vectors to {}", data.len(), path.display());
        Ok(())
    }
}

fn validate_rows(
    file_path: &str,
    chunks: &[CodeChunk],
    embeddings: &[Vec<f32>],
    dimension: usize,
) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(VectorStoreError::Validation(format!(
            "Number of chunks must match number of embeddings ({} vs {})",
            chunks.len(),
            embeddings.len()
        )));
    }
    if let Some(stray) = chunks.iter().find(|c| c.file_path != file_path) {
        return Err(VectorStoreError::Validation(format!(
            "chunk {} does not belong to {file_path}",
            stray.id()
        )));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if matches!(*state, State::Open(_)) {
            return Ok(());
        }
        *state = State::Open(self.load().await?);
        Ok(())
    }

    async fn add(
        &self,
        file_path: &str,
        chunks: Vec<CodeChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let State::Open(table) = &mut *state else {
            return Err(VectorStoreError::Uninitialized);
        };

        let dimension = table
            .as_ref()
            .map(|t| t.dimension)
            .or_else(|| embeddings.first().map(Vec::len))
            .unwrap_or(0);
        validate_rows(file_path, &chunks, &embeddings, dimension)?;

        if chunks.is_empty() {
            let removed = table.as_mut().and_then(|t| t.rows.remove(file_path));
            if removed.is_some() {
                self.mark_dirty();
            }
            return Ok(());
        }

        let rows: Vec<StoredChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(mut chunk, vector)| {
                chunk.score = None;
                StoredChunk {
                    id: chunk.id(),
                    chunk,
                    vector,
                }
            })
            .collect();

        log::debug!("Storing {} vector rows for {file_path}", rows.len());
        let table = table.get_or_insert_with(|| Table {
            dimension,
            rows: BTreeMap::new(),
        });
        table.rows.insert(file_path.to_string(), rows);
        self.mark_dirty();
        Ok(())
    }

    async fn delete(&self, file_path: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let State::Open(table) = &mut *state else {
            return Err(VectorStoreError::Uninitialized);
        };
        let Some(existing) = table.as_mut() else {
            return Ok(());
        };
        if existing.rows.remove(file_path).is_some() {
            log::debug!("Deleted vector rows for {file_path}");
            self.mark_dirty();
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        let State::Open(table) = &*state else {
            return Err(VectorStoreError::Uninitialized);
        };
        let Some(table) = table else {
            return Ok(Vec::new());
        };
        if limit == 0 || table.rows.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != table.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: table.dimension,
                actual: query.len(),
            });
        }

        // Cosine distance normalized to [0, 1]; score = 1 - distance.
        let mut scored: Vec<(&StoredChunk, f32)> = table
            .rows
            .values()
            .flatten()
            .map(|row| {
                let distance = (1.0 - cosine_similarity(query, &row.vector)) / 2.0;
                (row, (1.0 - distance).clamp(0.0, 1.0))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(row, score)| SearchResult {
                chunk: row.chunk.clone().with_score(score),
                score,
            })
            .collect())
    }

    async fn count(&self, file_path: Option<&str>) -> Result<usize> {
        let state = self.state.read().await;
        let State::Open(table) = &*state else {
            return Err(VectorStoreError::Uninitialized);
        };
        let Some(table) = table else {
            return Ok(0);
        };
        Ok(match file_path {
            Some(path) => table.rows.get(path).map_or(0, Vec::len),
            None => table.rows.values().map(Vec::len).sum(),
        })
    }

    async fn flush(&self) -> Result<()> {
        let _flushing = self.flush_lock.lock().await;
        let Some(path) = &self.path else {
            return match &*self.state.read().await {
                State::Closed => Err(VectorStoreError::Uninitialized),
                State::Open(_) => Ok(()),
            };
        };
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let written = self.write_snapshot(path).await;
        if written.is_err() {
            self.mark_dirty();
        }
        written
    }

    async fn dispose(&self) -> Result<()> {
        if matches!(*self.state.read().await, State::Closed) {
            return Ok(());
        }
        self.flush().await?;
        let mut state = self.state.write().await;
        *state = State::Closed;
        Ok(())
    }
}
