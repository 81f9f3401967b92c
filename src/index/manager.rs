//! Per-workspace inverted-index writers and readers.
//!
//! Exactly one writer per workspace index may be open at a time. Entries are
//! created lazily under a global creation lock and tracked in a concurrent
//! map keyed by index path; steady-state operations take only the per-entry
//! lock. A writer lock file older than the configured timeout is treated as
//! stuck and the whole index directory is cleared before reopening.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{
    Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument as Document,
    Term,
};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::index::schema::{self, LexicalSchema, line_for_offset};

/// Tantivy's writer lock sentinel inside the index directory.
const WRITER_LOCK_FILE: &str = ".tantivy-writer.lock";

/// Writer heap budget.
const WRITER_HEAP_BYTES: usize = 100_000_000;

/// Total budget for committing all writers on shutdown.
const SHUTDOWN_COMMIT_BUDGET: Duration = Duration::from_secs(30);

/// One search hit with per-line matches.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextHit {
    pub path: String,
    pub score: f32,
    /// (1-based line number, line text) for each matched line.
    pub lines: Vec<(u32, String)>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IndexStatistics {
    pub num_docs: u64,
    pub size_bytes: u64,
}

/// A single workspace's lexical index: the tantivy index, a manually
/// reloaded reader, and the (at most one) writer.
pub struct WorkspaceIndex {
    path: PathBuf,
    index: Index,
    reader: IndexReader,
    schema: LexicalSchema,
    writer: Mutex<Option<IndexWriter<Document>>>,
}

impl std::fmt::Debug for WorkspaceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceIndex")
            .field("path", &self.path)
            .finish()
    }
}

impl WorkspaceIndex {
    fn open(path: &Path) -> EngineResult<Self> {
        std::fs::create_dir_all(path)?;
        let (schema, lexical) = LexicalSchema::build();

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            let dir = MmapDirectory::open(path)?;
            Index::create(dir, schema, IndexSettings::default())?
        };
        schema::register_tokenizers(&index);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;

        Ok(Self {
            path: path.to_path_buf(),
            index,
            reader,
            schema: lexical,
            writer: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &LexicalSchema {
        &self.schema
    }

    /// Create the writer if absent. A young foreign lock surfaces as
    /// [`EngineError::IndexLocked`].
    fn ensure_writer(&self) -> EngineResult<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            let writer = self
                .index
                .writer::<Document>(WRITER_HEAP_BYTES)
                .map_err(|e| match e {
                    tantivy::TantivyError::LockFailure(_, _) => EngineError::IndexLocked {
                        path: self.path.clone(),
                    },
                    other => other.into(),
                })?;
            *guard = Some(writer);
        }
        Ok(())
    }

    /// Replace the document with this id. No commit happens here; batching
    /// is the batch indexer's job.
    pub fn update_document(&self, id: &str, doc: Document) -> EngineResult<()> {
        self.ensure_writer()?;
        let guard = self.writer.lock();
        let writer = guard.as_ref().ok_or_else(|| EngineError::Fatal(
            "writer vanished under per-entry lock".into(),
        ))?;
        writer.delete_term(Term::from_field_text(self.schema.id, id));
        writer.add_document(doc)?;
        Ok(())
    }

    /// Delete the document with this id (committed on next commit).
    pub fn delete_document(&self, id: &str) -> EngineResult<()> {
        self.ensure_writer()?;
        let guard = self.writer.lock();
        if let Some(writer) = guard.as_ref() {
            writer.delete_term(Term::from_field_text(self.schema.id, id));
        }
        Ok(())
    }

    /// Flush writer state to disk and refresh the reader.
    pub fn commit(&self) -> EngineResult<()> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.as_mut() {
            writer.commit()?;
        }
        drop(guard);
        self.reader.reload()?;
        Ok(())
    }

    /// Merge all searchable segments into one.
    pub fn optimize(&self) -> EngineResult<()> {
        self.commit()?;
        let segment_ids = self.index.searchable_segment_ids()?;
        if segment_ids.len() > 1 {
            let mut guard = self.writer.lock();
            if let Some(writer) = guard.as_mut() {
                writer.merge(&segment_ids).wait()?;
            }
            drop(guard);
            self.reader.reload()?;
        }
        Ok(())
    }

    /// Remove every document and commit.
    pub fn clear(&self) -> EngineResult<()> {
        self.ensure_writer()?;
        {
            let guard = self.writer.lock();
            if let Some(writer) = guard.as_ref() {
                writer.delete_all_documents()?;
            }
        }
        self.commit()
    }

    /// A fresh searcher. The reader is reloaded on every call so staleness
    /// is bounded by commit cadence, not reader lifetime.
    pub fn searcher(&self) -> EngineResult<tantivy::Searcher> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    pub fn num_docs(&self) -> EngineResult<u64> {
        Ok(self.searcher()?.num_docs())
    }

    /// Full-text search over content, filename, and symbol names.
    ///
    /// A trailing `~` on a single-term query requests fuzzy matching
    /// (edit distance 1, transpositions count as one edit). The automaton
    /// runs in prefix mode, so a typo in a word ending still reaches the
    /// indexed term ("kittie" is one edit from the "kitte" prefix of
    /// "kitten").
    pub fn search(&self, query_str: &str, limit: usize) -> EngineResult<Vec<TextHit>> {
        let searcher = self.searcher()?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        let (core, fuzzy) = match query_str.strip_suffix('~') {
            Some(rest) if !rest.contains(char::is_whitespace) => (rest, true),
            _ => (query_str, false),
        };

        if fuzzy {
            let term = Term::from_field_text(self.schema.content, &core.to_lowercase());
            clauses.push((
                Occur::Should,
                Box::new(FuzzyTermQuery::new_prefix(term, 1, true)),
            ));
        } else {
            let parser = QueryParser::for_index(
                &self.index,
                vec![
                    self.schema.content,
                    self.schema.content_code,
                    self.schema.filename,
                    self.schema.content_symbols,
                ],
            );
            match parser.parse_query(core) {
                Ok(parsed) => clauses.push((Occur::Should, parsed)),
                Err(_) => {
                    return Err(EngineError::InvalidArgument {
                        reason: "text query could not be parsed".into(),
                    });
                }
            }
            // Exact-content term for special-character queries.
            clauses.push((
                Occur::Should,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.content_literal, core),
                    IndexRecordOption::Basic,
                )),
            ));
        }

        let query = BooleanQuery::new(clauses);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let terms: Vec<String> = core
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: Document = searcher.doc(address)?;
            let path = doc
                .get_first(self.schema.path)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let content = doc
                .get_first(self.schema.content)
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let breaks: Vec<usize> = doc
                .get_first(self.schema.line_breaks)
                .and_then(|v| v.as_str())
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();

            let lines = matched_lines(content, &breaks, &terms);
            hits.push(TextHit { path, score, lines });
        }
        Ok(hits)
    }

    pub fn statistics(&self) -> EngineResult<IndexStatistics> {
        let num_docs = self.num_docs()?;
        let size_bytes = directory_size(&self.path);
        Ok(IndexStatistics {
            num_docs,
            size_bytes,
        })
    }

    /// Commit and drop the writer, releasing its file lock.
    fn release_writer(&self) -> EngineResult<()> {
        let mut guard = self.writer.lock();
        if let Some(mut writer) = guard.take() {
            writer.commit()?;
        }
        Ok(())
    }
}

/// Find lines containing any of the query terms (case-insensitive).
fn matched_lines(content: &str, breaks: &[usize], terms: &[String]) -> Vec<(u32, String)> {
    if terms.is_empty() {
        return Vec::new();
    }
    let lowered = content.to_lowercase();
    let mut line_numbers: Vec<u32> = Vec::new();
    for term in terms {
        let mut search_from = 0;
        while let Some(pos) = lowered[search_from..].find(term.as_str()) {
            let offset = search_from + pos;
            line_numbers.push(line_for_offset(breaks, offset));
            search_from = offset + term.len();
        }
    }
    line_numbers.sort_unstable();
    line_numbers.dedup();

    line_numbers
        .into_iter()
        .map(|number| {
            let start = if number <= 1 {
                0
            } else {
                breaks[number as usize - 2] + 1
            };
            let end = breaks
                .get(number as usize - 1)
                .copied()
                .unwrap_or(content.len());
            (number, content[start..end].to_string())
        })
        .collect()
}

fn directory_size(path: &Path) -> u64 {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

/// Owns every open workspace index in the process.
pub struct LexicalIndexManager {
    lock_timeout: Duration,
    entries: DashMap<PathBuf, Arc<WorkspaceIndex>>,
    creation_lock: Mutex<()>,
}

impl LexicalIndexManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            lock_timeout: settings.lock_timeout(),
            entries: DashMap::new(),
            creation_lock: Mutex::new(()),
        }
    }

    /// Open (or create) the index at `path`, recovering a stuck writer lock
    /// first. Subsequent calls return the same entry.
    pub fn get_or_open(&self, path: &Path) -> EngineResult<Arc<WorkspaceIndex>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(Arc::clone(&entry));
        }

        let _creation = self.creation_lock.lock();
        if let Some(entry) = self.entries.get(path) {
            return Ok(Arc::clone(&entry));
        }

        self.recover_stuck_lock(path)?;
        let entry = Arc::new(WorkspaceIndex::open(path)?);
        self.entries.insert(path.to_path_buf(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Entry with a live writer. A young foreign lock yields
    /// [`EngineError::IndexLocked`]; a stale one is recovered by clearing
    /// the directory and reopening.
    pub fn get_writer(&self, path: &Path) -> EngineResult<Arc<WorkspaceIndex>> {
        let entry = self.get_or_open(path)?;
        match entry.ensure_writer() {
            Ok(()) => Ok(entry),
            Err(EngineError::IndexLocked { .. }) => {
                if let Some(age) = self.stuck_lock_age(path) {
                    // The lock predates us by more than the timeout: the
                    // holder is gone. Nuke and reopen.
                    warn!(
                        "clearing stuck index at {} (lock age {}s)",
                        path.display(),
                        age.as_secs()
                    );
                    self.entries.remove(path);
                    std::fs::remove_dir_all(path)?;
                    let entry = self.get_or_open(path)?;
                    entry.ensure_writer()?;
                    Ok(entry)
                } else {
                    Err(EngineError::IndexLocked {
                        path: path.to_path_buf(),
                    })
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Read path: same entry, but never creates a writer.
    pub fn get_searcher(&self, path: &Path) -> EngineResult<Arc<WorkspaceIndex>> {
        self.get_or_open(path)
    }

    pub fn commit(&self, path: &Path) -> EngineResult<()> {
        self.get_or_open(path)?.commit()
    }

    pub fn optimize(&self, path: &Path) -> EngineResult<()> {
        self.get_or_open(path)?.optimize()
    }

    pub fn clear(&self, path: &Path) -> EngineResult<()> {
        self.get_or_open(path)?.clear()
    }

    pub fn index_exists(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || path.join("meta.json").exists()
    }

    pub fn statistics(&self, path: &Path) -> EngineResult<IndexStatistics> {
        self.get_or_open(path)?.statistics()
    }

    /// If the lock file is present and older than the timeout, clear the
    /// whole index directory. A younger lock is left alone.
    fn recover_stuck_lock(&self, path: &Path) -> EngineResult<()> {
        let Some(age) = self.stuck_lock_age(path) else {
            return Ok(());
        };
        warn!(
            "stuck writer lock at {} (age {}s > timeout {}s): clearing index directory",
            path.display(),
            age.as_secs(),
            self.lock_timeout.as_secs()
        );
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Age of the writer lock when it exceeds the timeout, else None.
    fn stuck_lock_age(&self, path: &Path) -> Option<Duration> {
        let lock_path = path.join(WRITER_LOCK_FILE);
        let modified = std::fs::metadata(&lock_path).ok()?.modified().ok()?;
        let age = modified.elapsed().ok()?;
        (age > self.lock_timeout).then_some(age)
    }

    /// Commit all writers and release their locks, bounded by a total
    /// 30-second budget. Entries that miss the budget are logged and left
    /// for stuck-lock recovery on next start.
    pub fn shutdown(&self) {
        let deadline = std::time::Instant::now() + SHUTDOWN_COMMIT_BUDGET;
        for entry in self.entries.iter() {
            if std::time::Instant::now() >= deadline {
                warn!(
                    "shutdown budget exhausted; {} left uncommitted",
                    entry.key().display()
                );
                break;
            }
            if let Err(e) = entry.value().release_writer() {
                warn!("commit on shutdown failed for {}: {e}", entry.key().display());
            } else {
                debug!("committed {} on shutdown", entry.key().display());
            }
        }
        self.entries.clear();
        info!("lexical index manager shut down");
    }
}
