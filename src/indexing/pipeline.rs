//! Turns a filesystem tree into lexical documents and symbol rows.
//!
//! Files are processed by a bounded worker pool; the final writer
//! interaction is serialized by the batch indexer. A file that fails is
//! logged and skipped, the rest of the workspace still indexes. The
//! pipeline is cancellable at file boundaries.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::index::batch::BatchIndexer;
use crate::index::manager::LexicalIndexManager;
use crate::index::schema::FileDocument;
use crate::indexing::extractor::SymbolExtractor;
use crate::indexing::walker::FileWalker;
use crate::monitor::{MemoryPressureMonitor, OpKind};
use crate::storage::SymbolDb;
use crate::types::FileRecord;

/// An index written within this window is considered fresh and the full
/// pipeline short-circuits on startup.
const FRESHNESS_WINDOW_SECS: u64 = 60 * 60;

/// Everything the pipeline needs to know about one workspace.
#[derive(Clone)]
pub struct WorkspaceHandles {
    pub root: PathBuf,
    pub hash: String,
    pub index_path: PathBuf,
    pub db: Arc<Mutex<SymbolDb>>,
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct IndexStats {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub symbols: u64,
    pub duration_ms: u64,
    pub skipped_fresh: bool,
}

enum FileOutcome {
    Indexed { symbols: u64 },
    Skipped,
    Failed,
}

/// Producer side of the engine: walks a workspace and feeds both indexes.
pub struct IndexingPipeline {
    settings: Arc<Settings>,
    walker: Arc<FileWalker>,
    extractor: SymbolExtractor,
    manager: Arc<LexicalIndexManager>,
    batch: Arc<BatchIndexer>,
    monitor: Arc<MemoryPressureMonitor>,
}

impl IndexingPipeline {
    pub fn new(
        settings: Arc<Settings>,
        manager: Arc<LexicalIndexManager>,
        batch: Arc<BatchIndexer>,
        monitor: Arc<MemoryPressureMonitor>,
    ) -> Self {
        let walker = Arc::new(FileWalker::new(Arc::clone(&settings)));
        let extractor = SymbolExtractor::new(&settings.extractor);
        Self {
            settings,
            walker,
            extractor,
            manager,
            batch,
            monitor,
        }
    }

    pub fn extractor(&self) -> &SymbolExtractor {
        &self.extractor
    }

    /// Index a whole workspace. `force` bypasses the skip-if-fresh check.
    pub async fn index_workspace(
        &self,
        ws: &WorkspaceHandles,
        force: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<IndexStats> {
        if self.monitor.should_throttle(OpKind::BatchIndex) {
            return Err(EngineError::ResourceExhausted {
                reason: "memory pressure: indexing is paused".into(),
            });
        }
        if !force && self.settings.indexing.skip_if_fresh && self.is_fresh(&ws.index_path) {
            info!("index for {} is fresh; skipping", ws.root.display());
            return Ok(IndexStats {
                skipped_fresh: true,
                ..IndexStats::default()
            });
        }

        let started = Instant::now();
        let files: Vec<PathBuf> = self.walker.walk(&ws.root).collect();
        let concurrency = self
            .monitor
            .recommended_concurrency(self.settings.memory_limits.max_indexing_concurrency);
        debug!(
            "indexing {} files from {} with {} workers",
            files.len(),
            ws.root.display(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set = tokio::task::JoinSet::new();
        let mut stats = IndexStats::default();

        for file in files {
            if cancel.is_cancelled() {
                debug!("indexing cancelled at file boundary");
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::Fatal("worker semaphore closed".into()))?;
            let task = FileTask {
                settings: Arc::clone(&self.settings),
                walker: Arc::clone(&self.walker),
                extractor: self.extractor.clone(),
                manager: Arc::clone(&self.manager),
                batch: Arc::clone(&self.batch),
                ws: ws.clone(),
            };
            join_set.spawn(async move {
                let outcome = task.run(&file).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(FileOutcome::Indexed { symbols }) => {
                    stats.files_indexed += 1;
                    stats.symbols += symbols;
                }
                Ok(FileOutcome::Skipped) => stats.files_skipped += 1,
                Ok(FileOutcome::Failed) => stats.files_failed += 1,
                Err(e) => {
                    warn!("indexing worker panicked: {e}");
                    stats.files_failed += 1;
                }
            }
        }

        self.batch.flush_workspace(&ws.index_path).await?;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "indexed {} ({} files, {} symbols, {} ms)",
            ws.root.display(),
            stats.files_indexed,
            stats.symbols,
            stats.duration_ms
        );
        Ok(stats)
    }

    /// Re-index a single file (watcher path). Flushes immediately so the
    /// change becomes searchable without waiting for the age timer.
    pub async fn index_file(&self, ws: &WorkspaceHandles, path: &Path) -> EngineResult<()> {
        let task = FileTask {
            settings: Arc::clone(&self.settings),
            walker: Arc::clone(&self.walker),
            extractor: self.extractor.clone(),
            manager: Arc::clone(&self.manager),
            batch: Arc::clone(&self.batch),
            ws: ws.clone(),
        };
        match task.run(path).await {
            FileOutcome::Failed => Err(EngineError::Fatal(format!(
                "re-index of {} failed",
                path.display()
            ))),
            _ => self.batch.flush_workspace(&ws.index_path).await,
        }
    }

    /// Remove a deleted file from both indexes.
    pub async fn remove_file(&self, ws: &WorkspaceHandles, path: &Path) -> EngineResult<()> {
        let rel = relative_path(&ws.root, path);
        {
            let mut db = ws.db.lock().await;
            db.delete_file(&rel)?;
        }
        let entry = self.manager.get_writer(&ws.index_path)?;
        entry.delete_document(&rel)?;
        entry.commit()?;
        info!("removed {} from index", rel);
        Ok(())
    }

    fn is_fresh(&self, index_path: &Path) -> bool {
        let meta = index_path.join("meta.json");
        std::fs::metadata(meta)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age.as_secs() < FRESHNESS_WINDOW_SECS)
            .unwrap_or(false)
    }
}

/// One file's trip through steps read → extract → upsert → enqueue.
struct FileTask {
    settings: Arc<Settings>,
    walker: Arc<FileWalker>,
    extractor: SymbolExtractor,
    manager: Arc<LexicalIndexManager>,
    batch: Arc<BatchIndexer>,
    ws: WorkspaceHandles,
}

impl FileTask {
    async fn run(&self, path: &Path) -> FileOutcome {
        match self.index_one(path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("indexing {} failed: {e}", path.display());
                FileOutcome::Failed
            }
        }
    }

    async fn index_one(&self, path: &Path) -> EngineResult<FileOutcome> {
        let metadata = std::fs::metadata(path).map_err(|e| EngineError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        if metadata.len() > self.settings.indexing.max_file_size {
            warn!(
                "skipping {} ({} bytes > max_file_size)",
                path.display(),
                metadata.len()
            );
            return Ok(FileOutcome::Skipped);
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            debug!("skipping non-UTF-8 file {}", path.display());
            return Ok(FileOutcome::Skipped);
        };
        let language = self
            .walker
            .language_of(path)
            .unwrap_or("text")
            .to_string();
        let rel = relative_path(&self.ws.root, path);
        let content_hash = {
            let digest = Sha256::digest(content.as_bytes());
            digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
        };
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        // Unchanged content means nothing to do.
        {
            let db = self.ws.db.lock().await;
            if let Some(existing) = db.get_file(&rel)? {
                if existing.content_hash == content_hash {
                    return Ok(FileOutcome::Skipped);
                }
            }
        }

        let mut extracted = self.extractor.extract_or_empty(path).await;
        // The extractor sees absolute paths; rows are stored
        // workspace-relative.
        for symbol in &mut extracted.symbols {
            symbol.file_path = rel.clone();
        }
        for ident in &mut extracted.identifiers {
            ident.file_path = rel.clone();
        }

        let record = FileRecord {
            path: rel.clone(),
            content: content.clone(),
            language,
            size_bytes: metadata.len(),
            last_modified_ms: modified_ms,
            content_hash,
        };
        let symbol_count = extracted.symbols.len() as u64;
        {
            let mut db = self.ws.db.lock().await;
            db.upsert_file_symbols(
                &record,
                &extracted.symbols,
                &extracted.identifiers,
                &extracted.relationships,
            )?;
        }

        let entry = self.manager.get_or_open(&self.ws.index_path)?;
        let doc = FileDocument {
            path: rel.clone(),
            content,
            symbols: extracted.symbols.iter().map(|s| s.name.clone()).collect(),
            size_bytes: metadata.len(),
            modified_ms,
        }
        .into_document(entry.schema());
        self.batch.add_document(&self.ws.index_path, rel, doc).await?;

        Ok(FileOutcome::Indexed {
            symbols: symbol_count,
        })
    }
}

/// Workspace-relative path with forward slashes.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(root: &Path) -> (TempDir, IndexingPipeline, WorkspaceHandles) {
        let base = TempDir::new().unwrap();
        let settings = Arc::new(Settings::default());
        let manager = Arc::new(LexicalIndexManager::new(&settings));
        let monitor = Arc::new(MemoryPressureMonitor::new(&settings));
        let batch = Arc::new(BatchIndexer::new(
            &settings,
            Arc::clone(&manager),
            Arc::clone(&monitor),
        ));
        let pipeline = IndexingPipeline::new(
            Arc::clone(&settings),
            Arc::clone(&manager),
            batch,
            monitor,
        );
        let index_path = base.path().join("lex");
        let db = SymbolDb::open(base.path().join("ws.db")).unwrap();
        let handles = WorkspaceHandles {
            root: root.to_path_buf(),
            hash: "cafebabe00000000".into(),
            index_path,
            db: Arc::new(Mutex::new(db)),
        };
        (base, pipeline, handles)
    }

    #[tokio::test]
    async fn indexes_workspace_files() {
        let ws_dir = TempDir::new().unwrap();
        std::fs::write(ws_dir.path().join("a.txt"), "hello world\nfoo").unwrap();
        std::fs::write(ws_dir.path().join("b.txt"), "hello kitten").unwrap();

        let (_base, pipeline, handles) = fixture(ws_dir.path());
        let cancel = CancellationToken::new();
        let stats = pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();
        assert_eq!(stats.files_indexed, 2);

        let entry = pipeline.manager.get_or_open(&handles.index_path).unwrap();
        let hits = entry.search("hello", 10).unwrap();
        assert_eq!(hits.len(), 2);
        let kitten = entry.search("kitten", 10).unwrap();
        assert_eq!(kitten.len(), 1);
        assert_eq!(kitten[0].path, "b.txt");

        let db = handles.db.lock().await;
        assert_eq!(db.file_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn unchanged_files_are_skipped_on_reindex() {
        let ws_dir = TempDir::new().unwrap();
        std::fs::write(ws_dir.path().join("a.txt"), "stable content").unwrap();

        let (_base, pipeline, handles) = fixture(ws_dir.path());
        let cancel = CancellationToken::new();
        let first = pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();
        assert_eq!(first.files_indexed, 1);

        let second = pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 1);
    }

    #[tokio::test]
    async fn single_file_update_replaces_content() {
        let ws_dir = TempDir::new().unwrap();
        let file = ws_dir.path().join("a.txt");
        std::fs::write(&file, "hello world\nfoo").unwrap();

        let (_base, pipeline, handles) = fixture(ws_dir.path());
        let cancel = CancellationToken::new();
        pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();

        std::fs::write(&file, "hello world\nbaz").unwrap();
        pipeline.index_file(&handles, &file).await.unwrap();

        let entry = pipeline.manager.get_or_open(&handles.index_path).unwrap();
        assert!(entry.search("foo", 10).unwrap().is_empty());
        assert_eq!(entry.search("baz", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removed_file_disappears_from_both_indexes() {
        let ws_dir = TempDir::new().unwrap();
        let file = ws_dir.path().join("a.txt");
        std::fs::write(&file, "doomed words").unwrap();

        let (_base, pipeline, handles) = fixture(ws_dir.path());
        let cancel = CancellationToken::new();
        pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();

        pipeline.remove_file(&handles, &file).await.unwrap();
        let entry = pipeline.manager.get_or_open(&handles.index_path).unwrap();
        assert!(entry.search("doomed", 10).unwrap().is_empty());
        let db = handles.db.lock().await;
        assert!(db.get_file("a.txt").unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_files_are_skipped() {
        let ws_dir = TempDir::new().unwrap();
        std::fs::write(ws_dir.path().join("big.txt"), "x".repeat(64)).unwrap();

        let base = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.indexing.max_file_size = 10;
        let settings = Arc::new(settings);
        let manager = Arc::new(LexicalIndexManager::new(&settings));
        let monitor = Arc::new(MemoryPressureMonitor::new(&settings));
        let batch = Arc::new(BatchIndexer::new(
            &settings,
            Arc::clone(&manager),
            Arc::clone(&monitor),
        ));
        let pipeline = IndexingPipeline::new(
            Arc::clone(&settings),
            Arc::clone(&manager),
            batch,
            monitor,
        );
        let handles = WorkspaceHandles {
            root: ws_dir.path().to_path_buf(),
            hash: "cafebabe00000001".into(),
            index_path: base.path().join("lex"),
            db: Arc::new(Mutex::new(SymbolDb::open(base.path().join("ws.db")).unwrap())),
        };

        let stats = pipeline
            .index_workspace(&handles, true, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(stats.files_skipped, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_at_file_boundary() {
        let ws_dir = TempDir::new().unwrap();
        for i in 0..20 {
            std::fs::write(ws_dir.path().join(format!("f{i}.txt")), "words").unwrap();
        }
        let (_base, pipeline, handles) = fixture(ws_dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = pipeline
            .index_workspace(&handles, true, &cancel)
            .await
            .unwrap();
        assert_eq!(stats.files_indexed, 0);
    }
}
