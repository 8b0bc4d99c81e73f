//! SQLite-backed system of record for per-file index state.
//!
//! Two tables live in one database:
//!
//! - `file_metadata`: one row per workspace file (hash, mtime, indexed flag)
//! - `chunk_fts`: FTS5 table of chunk text, used for lexical retrieval and as
//!   the chunk source for recency retrieval
//!
//! Every call runs on the blocking pool; the connection is guarded by a
//! mutex and is `None` until [`MetadataStore::initialize`] succeeds.

use crate::error::MetadataError;
use crate::workspace::now_ms;
use context_code_chunker::CodeChunk;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub type Result<T> = std::result::Result<T, MetadataError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_metadata (
        file_path        TEXT PRIMARY KEY,
        content_hash     TEXT NOT NULL,
        last_modified_ms INTEGER NOT NULL,
        indexed          INTEGER NOT NULL DEFAULT 0,
        indexed_at_ms    INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_file_metadata_modified
        ON file_metadata(last_modified_ms DESC);
    CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
        file_path UNINDEXED,
        start_line UNINDEXED,
        end_line UNINDEXED,
        content
    );
";

/// Per-file index record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    /// Hex SHA-256 of the file content
    pub content_hash: String,
    pub last_modified_ms: i64,
    /// `true` only when the file's vector rows are in the vector store
    pub indexed: bool,
    pub indexed_at_ms: Option<i64>,
}

pub struct MetadataStore {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl MetadataStore {
    /// Store kept entirely in memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the database and apply the schema. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some() {
                return Ok(());
            }
            let conn = match &path {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let conn = Connection::open(path)?;
                    conn.execute_batch(
                        "PRAGMA journal_mode = WAL;
                         PRAGMA synchronous = NORMAL;
                         PRAGMA busy_timeout = 5000;",
                    )?;
                    conn
                }
                None => Connection::open_in_memory()?,
            };
            conn.execute_batch(SCHEMA)?;
            log::debug!(
                "Metadata store opened ({})",
                path.as_deref()
                    .map_or_else(|| "memory".to_string(), |p| p.display().to_string())
            );
            *guard = Some(conn);
            Ok(())
        })
        .await?
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let conn = guard.as_mut().ok_or(MetadataError::Uninitialized)?;
            f(conn)
        })
        .await?
    }

    pub async fn save_metadata(&self, record: FileRecord) -> Result<()> {
        self.with_conn(move |conn| {
            upsert_record(conn, &record)?;
            Ok(())
        })
        .await
    }

    pub async fn get_metadata(&self, file_path: &str) -> Result<Option<FileRecord>> {
        let file_path = file_path.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT file_path, content_hash, last_modified_ms, indexed, indexed_at_ms
                     FROM file_metadata WHERE file_path = ?1",
                    params![file_path],
                    parse_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    /// Delete a file's record and its lexical chunks
    pub async fn delete_metadata(&self, file_path: &str) -> Result<bool> {
        let file_path = file_path.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chunk_fts WHERE file_path = ?1", params![file_path])?;
            let removed = tx.execute(
                "DELETE FROM file_metadata WHERE file_path = ?1",
                params![file_path],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    pub async fn get_indexed_files(&self) -> Result<Vec<FileRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT file_path, content_hash, last_modified_ms, indexed, indexed_at_ms
                 FROM file_metadata WHERE indexed = 1 ORDER BY file_path",
            )?;
            let rows = stmt.query_map([], parse_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Paths of every recorded file, indexed or not
    pub async fn known_files(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT file_path FROM file_metadata")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
        })
        .await
    }

    /// `(recorded files, indexed files)`
    pub async fn file_counts(&self) -> Result<(usize, usize)> {
        self.with_conn(|conn| {
            let (total, indexed): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(indexed), 0) FROM file_metadata",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((to_usize(total), to_usize(indexed)))
        })
        .await
    }

    /// Write a file's record and replace its lexical chunks in one transaction
    pub async fn commit_file(&self, record: FileRecord, chunks: Vec<CodeChunk>) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chunk_fts WHERE file_path = ?1",
                params![record.file_path],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO chunk_fts (file_path, start_line, end_line, content)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for chunk in &chunks {
                    insert.execute(params![
                        record.file_path,
                        to_i64(chunk.start_line),
                        to_i64(chunk.end_line),
                        chunk.content
                    ])?;
                }
            }
            upsert_record(&tx, &record)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// BM25-ranked chunks matching any term of `query`.
    ///
    /// Scores are `s / (1 + s)` of the negated BM25 rank, so they fall in
    /// `[0, 1)`. Queries without searchable terms return nothing.
    pub async fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<CodeChunk>> {
        let expr = fts_expression(query);
        let limit = to_i64(limit);
        self.with_conn(move |conn| {
            let Some(expr) = expr else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare(
                "SELECT file_path, start_line, end_line, content, bm25(chunk_fts)
                 FROM chunk_fts
                 WHERE chunk_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![expr, limit], |row| {
                let rank: f64 = row.get(4)?;
                let s = (-rank).max(0.0);
                #[allow(clippy::cast_possible_truncation)]
                let score = (s / (1.0 + s)) as f32;
                Ok(parse_chunk(row)?.with_score(score))
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Chunks of files modified at or after `threshold_ms`, newest first.
    ///
    /// Score decays with age: `1 / (1 + age_hours)`.
    pub async fn get_recently_modified_files(
        &self,
        threshold_ms: i64,
        limit: usize,
    ) -> Result<Vec<CodeChunk>> {
        let limit = to_i64(limit);
        let now = now_ms();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.file_path, c.start_line, c.end_line, c.content, m.last_modified_ms
                 FROM file_metadata m
                 JOIN chunk_fts c ON c.file_path = m.file_path
                 WHERE m.last_modified_ms >= ?1
                 ORDER BY m.last_modified_ms DESC, c.file_path ASC, c.start_line ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![threshold_ms, limit], |row| {
                let modified: i64 = row.get(4)?;
                #[allow(clippy::cast_precision_loss)]
                let age_hours = (now - modified).max(0) as f32 / 3_600_000.0;
                Ok(parse_chunk(row)?.with_score(1.0 / (1.0 + age_hours)))
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    /// Number of lexical chunk rows for one file
    pub async fn chunk_count(&self, file_path: &str) -> Result<usize> {
        let file_path = file_path.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunk_fts WHERE file_path = ?1",
                params![file_path],
                |row| row.get(0),
            )?;
            Ok(to_usize(count))
        })
        .await
    }

    /// Close the connection; later calls fail with `Uninitialized`.
    pub async fn dispose(&self) -> Result<()> {
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            drop(conn);
        })
        .await?;
        Ok(())
    }
}

fn upsert_record(conn: &Connection, record: &FileRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO file_metadata (file_path, content_hash, last_modified_ms, indexed, indexed_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(file_path) DO UPDATE SET
            content_hash = excluded.content_hash,
            last_modified_ms = excluded.last_modified_ms,
            indexed = excluded.indexed,
            indexed_at_ms = excluded.indexed_at_ms",
        params![
            record.file_path,
            record.content_hash,
            record.last_modified_ms,
            record.indexed,
            record.indexed_at_ms
        ],
    )
}

fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        file_path: row.get(0)?,
        content_hash: row.get(1)?,
        last_modified_ms: row.get(2)?,
        indexed: row.get(3)?,
        indexed_at_ms: row.get(4)?,
    })
}

fn parse_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<CodeChunk> {
    let start: i64 = row.get(1)?;
    let end: i64 = row.get(2)?;
    Ok(CodeChunk::new(
        row.get(0)?,
        to_usize(start),
        to_usize(end),
        row.get(3)?,
    ))
}

/// Quote each alphanumeric term and OR them together so user text can never
/// be parsed as FTS5 syntax.
fn fts_expression(query: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .map(|t| format!("\"{t}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
