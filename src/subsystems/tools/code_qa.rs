//! `code_qa`: answer a question about the files in one directory.
//!
//! Files directly inside the directory are chunked and indexed into an
//! in-memory SQLite FTS5 table.  Indexes are cached per directory and
//! rebuilt when the (name, size, mtime) fingerprint of the directory
//! changes, or dropped explicitly via [`CodeQaTool::invalidate`].  The top-k
//! bm25 passages go to the LLM together with the prompt.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use rusqlite::{Connection, params};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use text_splitter::TextSplitter;
use tracing::{debug, info, warn};

use crate::core::config::CodeQaToolConfig;
use crate::subsystems::memory::sqlite::fts5_any_terms;

use super::context::ToolContext;
use super::error::ToolError;

const NO_DOCUMENTS: &str = "no documents found";

const ANSWER_PROMPT: &str = "You answer questions about a code base. Use only the passages \
provided; say so when they do not contain the answer.";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QaInput {
    prompt: String,
    path: String,
}

/// Most directories kept indexed at once; the least recently used is
/// evicted first.
const MAX_CACHED_INDEXES: usize = 8;

struct CachedIndex {
    fingerprint: String,
    conn: Arc<Mutex<Connection>>,
    last_used: u64,
}

#[derive(Default)]
struct IndexCache {
    entries: HashMap<PathBuf, CachedIndex>,
    clock: u64,
}

impl IndexCache {
    /// The cached index of `dir` if its fingerprint still matches.
    fn fresh(&mut self, dir: &Path, fingerprint: &str) -> Option<Arc<Mutex<Connection>>> {
        self.clock += 1;
        let now = self.clock;
        let entry = self.entries.get_mut(dir).filter(|e| e.fingerprint == fingerprint)?;
        entry.last_used = now;
        Some(entry.conn.clone())
    }

    fn insert(&mut self, dir: PathBuf, fingerprint: String, conn: Arc<Mutex<Connection>>, cap: usize) {
        self.clock += 1;
        self.entries.insert(dir, CachedIndex { fingerprint, conn, last_used: self.clock });
        while self.entries.len() > cap.max(1) {
            let Some(oldest) = self.entries.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone())
            else {
                break;
            };
            debug!(dir = %oldest.display(), "evicting document index");
            self.entries.remove(&oldest);
        }
    }
}

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub file: String,
    pub text: String,
}

#[derive(Clone)]
pub struct CodeQaTool {
    root_dir: PathBuf,
    chunk_size: usize,
    top_k: usize,
    max_cached: usize,
    cache: Arc<Mutex<IndexCache>>,
}

impl CodeQaTool {
    pub fn new(config: &CodeQaToolConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            chunk_size: config.chunk_size,
            top_k: config.top_k,
            max_cached: MAX_CACHED_INDEXES,
            cache: Arc::default(),
        }
    }

    pub async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let parsed: QaInput = serde_json::from_str(input.trim()).map_err(|e| {
            ToolError::InvalidInput(format!(
                "expected JSON {{\"prompt\": string, \"path\": string}}: {e}"
            ))
        })?;
        if parsed.prompt.trim().is_empty() {
            return Err(ToolError::InvalidInput("empty prompt".into()));
        }

        let passages = self.retrieve(&parsed.path, &parsed.prompt).await?;
        let context = passages
            .iter()
            .map(|p| format!("[{}]\n{}", p.file, p.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        ctx.complete(ANSWER_PROMPT, format!("Passages:\n{context}\n\nQuestion: {}", parsed.prompt))
            .await
    }

    /// Top-k passages of the directory `path` for `query`, refreshing the
    /// cached index first if the directory changed.
    pub async fn retrieve(&self, path: &str, query: &str) -> Result<Vec<Passage>, ToolError> {
        let dir = resolve_dir(&self.root_dir, path)?;
        let this = self.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || this.retrieve_blocking(&dir, &query))
            .await
            .map_err(|e| ToolError::Backend(format!("index task join: {e}")))?
    }

    /// Drop the cached index of `path`. Returns whether one existed.
    ///
    /// Index builds never hold the cache lock, so this only waits for other
    /// map lookups.
    pub fn invalidate(&self, path: &str) -> Result<bool, ToolError> {
        let dir = resolve_dir(&self.root_dir, path)?;
        let removed = self.lock()?.entries.remove(&dir).is_some();
        debug!(dir = %dir.display(), removed, "document index invalidated");
        Ok(removed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexCache>, ToolError> {
        self.cache
            .lock()
            .map_err(|_| ToolError::Backend("document index cache poisoned".into()))
    }

    fn retrieve_blocking(&self, dir: &Path, query: &str) -> Result<Vec<Passage>, ToolError> {
        let files = scan_documents(dir);
        if files.is_empty() {
            self.lock()?.entries.remove(dir);
            return Err(ToolError::NotFound(NO_DOCUMENTS.into()));
        }
        let fingerprint = fingerprint(&files);

        let cached = self.lock()?.fresh(dir, &fingerprint);
        let conn = match cached {
            Some(conn) => conn,
            None => {
                let documents = read_documents(&files);
                if documents.is_empty() {
                    self.lock()?.entries.remove(dir);
                    return Err(ToolError::NotFound(NO_DOCUMENTS.into()));
                }
                let conn = Arc::new(Mutex::new(build_index(&documents, self.chunk_size)?));
                info!(dir = %dir.display(), files = documents.len(), "document index built");
                self.lock()?.insert(dir.to_path_buf(), fingerprint, conn.clone(), self.max_cached);
                conn
            }
        };
        let conn = conn
            .lock()
            .map_err(|_| ToolError::Backend("document index poisoned".into()))?;
        search(&conn, query, self.top_k)
    }
}

/// Map the user-supplied `path` to a directory under `root`.
///
/// Leading `/` is stripped, `..` is denied, and a last component containing
/// `.` is taken as a file name so its parent is used.
pub fn resolve_dir(root: &Path, path: &str) -> Result<PathBuf, ToolError> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(path.trim().trim_start_matches('/')).components() {
        match component {
            Component::Normal(p) => parts.push(p),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::Denied(format!("path escapes the code root: {path:?}")));
            }
        }
    }
    if parts.last().is_some_and(|p| p.to_string_lossy().contains('.')) {
        parts.pop();
    }
    Ok(parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p)))
}

/// A regular file directly inside the indexed directory.
struct FileStat {
    path: PathBuf,
    name: String,
    size: u64,
    mtime_ns: u128,
}

struct Document {
    name: String,
    content: String,
}

/// Regular files directly inside `dir`, sorted by name.  Only metadata is
/// read here.
fn scan_documents(dir: &Path) -> Vec<FileStat> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "code directory not readable");
        return Vec::new();
    };
    let mut files: Vec<FileStat> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(|m| m.is_file())?;
            let mtime_ns = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            Some(FileStat {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                mtime_ns,
            })
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

/// Contents of the files that are valid UTF-8.
fn read_documents(files: &[FileStat]) -> Vec<Document> {
    files
        .iter()
        .filter_map(|f| {
            let content = std::fs::read_to_string(&f.path).ok()?;
            Some(Document { name: f.name.clone(), content })
        })
        .collect()
}

fn fingerprint(files: &[FileStat]) -> String {
    let mut hasher = Sha256::new();
    for f in files {
        hasher.update(f.name.as_bytes());
        hasher.update([0]);
        hasher.update(f.size.to_le_bytes());
        hasher.update(f.mtime_ns.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

fn build_index(files: &[Document], chunk_size: usize) -> Result<Connection, ToolError> {
    let fail = |e: rusqlite::Error| {
        warn!(error = %e, "document index build failed");
        ToolError::Backend(format!("document index: {e}"))
    };
    let mut conn = Connection::open_in_memory().map_err(fail)?;
    conn.execute_batch("CREATE VIRTUAL TABLE chunks USING fts5(file UNINDEXED, text);")
        .map_err(fail)?;

    let splitter = TextSplitter::new(chunk_size);
    let tx = conn.transaction().map_err(fail)?;
    {
        let mut insert = tx
            .prepare("INSERT INTO chunks (file, text) VALUES (?1, ?2)")
            .map_err(fail)?;
        for f in files {
            for chunk in splitter.chunks(&f.content) {
                insert.execute(params![f.name, chunk]).map_err(fail)?;
            }
        }
    }
    tx.commit().map_err(fail)?;
    Ok(conn)
}

fn search(conn: &Connection, query: &str, top_k: usize) -> Result<Vec<Passage>, ToolError> {
    let fail = |e: rusqlite::Error| {
        warn!(error = %e, "document index search failed");
        ToolError::Backend(format!("document index: {e}"))
    };
    let read = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<Vec<Passage>, ToolError> {
        let mut stmt = conn.prepare(sql).map_err(fail)?;
        stmt.query_map(args, |row| Ok(Passage { file: row.get(0)?, text: row.get(1)? }))
            .map_err(fail)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)
    };

    let limit = top_k as i64;
    let terms = fts5_any_terms(query);
    let hits = if terms.is_empty() {
        Vec::new()
    } else {
        read(
            "SELECT file, text FROM chunks WHERE chunks MATCH ?1 ORDER BY bm25(chunks) LIMIT ?2",
            &[&terms, &limit],
        )?
    };
    if !hits.is_empty() {
        return Ok(hits);
    }
    // Nothing matched: fall back to the leading passages so the answer still has context.
    read("SELECT file, text FROM chunks ORDER BY rowid LIMIT ?1", &[&limit])
}
