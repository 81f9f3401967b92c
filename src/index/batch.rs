//! Accumulates document updates per workspace and flushes them in batches.
//!
//! Two triggers: buffer size (default 500 documents) and buffer age (a
//! periodic timer, default 30 s). Writes are never committed on add; one
//! commit per flush. Flushes for the same workspace serialize on the
//! per-workspace async lock, so the restore-on-failure path cannot
//! interleave with another flush.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tantivy::TantivyDocument as Document;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::index::manager::LexicalIndexManager;
use crate::monitor::{MemoryPressureMonitor, OpKind};
use std::path::PathBuf;

/// Budget for draining all buffers on shutdown.
const SHUTDOWN_FLUSH_BUDGET: Duration = Duration::from_secs(30);

struct PendingDoc {
    id: String,
    doc: Document,
}

#[derive(Default)]
struct Buffer {
    pending: VecDeque<PendingDoc>,
    oldest: Option<Instant>,
}

/// Per-workspace pending-document buffers with size- and age-based flushing.
pub struct BatchIndexer {
    manager: Arc<LexicalIndexManager>,
    monitor: Arc<MemoryPressureMonitor>,
    batch_size: usize,
    max_age: Duration,
    buffers: DashMap<PathBuf, Arc<Mutex<Buffer>>>,
    flushed_docs: AtomicU64,
}

impl BatchIndexer {
    pub fn new(
        settings: &Settings,
        manager: Arc<LexicalIndexManager>,
        monitor: Arc<MemoryPressureMonitor>,
    ) -> Self {
        Self {
            manager,
            monitor,
            batch_size: settings.batch.size,
            max_age: settings.max_batch_age(),
            buffers: DashMap::new(),
            flushed_docs: AtomicU64::new(0),
        }
    }

    /// Queue a document update for the workspace index at `index_path`.
    ///
    /// Under High or Critical pressure new work is rejected with
    /// `ResourceExhausted`. A full buffer triggers a background flush.
    pub async fn add_document(
        self: &Arc<Self>,
        index_path: &PathBuf,
        id: String,
        doc: Document,
    ) -> EngineResult<()> {
        if self.monitor.should_throttle(OpKind::BatchIndex) {
            return Err(EngineError::ResourceExhausted {
                reason: "memory pressure: batch indexing is paused".into(),
            });
        }

        let buffer = self.buffer_for(index_path);
        let should_flush = {
            let mut guard = buffer.lock().await;
            if guard.pending.is_empty() {
                guard.oldest = Some(Instant::now());
            }
            guard.pending.push_back(PendingDoc { id, doc });
            guard.pending.len() >= self.effective_batch_size()
        };

        if should_flush {
            let this = Arc::clone(self);
            let path = index_path.clone();
            tokio::spawn(async move {
                if let Err(e) = this.flush_workspace(&path).await {
                    error!("background flush for {} failed: {e}", path.display());
                }
            });
        }
        Ok(())
    }

    /// Drain and commit one workspace's buffer.
    ///
    /// On failure the documents are put back at the *front* of the buffer in
    /// their original order (later updates for the same id must still win)
    /// and the error propagates.
    pub async fn flush_workspace(&self, index_path: &PathBuf) -> EngineResult<()> {
        let buffer = self.buffer_for(index_path);
        let mut guard = buffer.lock().await;
        if guard.pending.is_empty() {
            return Ok(());
        }
        let drained: Vec<PendingDoc> = guard.pending.drain(..).collect();
        guard.oldest = None;

        match self.write_batch(index_path, &drained) {
            Ok(()) => {
                self.flushed_docs
                    .fetch_add(drained.len() as u64, Ordering::Relaxed);
                debug!(
                    "flushed {} documents to {}",
                    drained.len(),
                    index_path.display()
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    "flush of {} documents to {} failed, restoring buffer: {e}",
                    drained.len(),
                    index_path.display()
                );
                for doc in drained.into_iter().rev() {
                    guard.pending.push_front(doc);
                }
                guard.oldest = Some(Instant::now());
                Err(e)
            }
        }
    }

    fn write_batch(&self, index_path: &PathBuf, batch: &[PendingDoc]) -> EngineResult<()> {
        let entry = self.manager.get_writer(index_path)?;
        for pending in batch {
            entry.update_document(&pending.id, pending.doc.clone())?;
        }
        entry.commit()
    }

    /// Flush buffers whose oldest document exceeds the configured age.
    /// Called by the maintenance timer.
    pub async fn flush_aged(&self) {
        let paths: Vec<PathBuf> = self
            .buffers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for path in paths {
            let is_aged = {
                let buffer = self.buffer_for(&path);
                let guard = buffer.lock().await;
                guard
                    .oldest
                    .map(|at| at.elapsed() >= self.max_age)
                    .unwrap_or(false)
            };
            if is_aged {
                if let Err(e) = self.flush_workspace(&path).await {
                    error!("aged flush for {} failed: {e}", path.display());
                }
            }
        }
    }

    /// Spawn the age-based flush timer.
    pub fn start_maintenance(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let period = this.max_age;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => this.flush_aged().await,
                }
            }
        })
    }

    /// Drain everything, bounded by a 30-second budget. Buffers still
    /// pending afterwards are logged and abandoned.
    pub async fn shutdown(&self) {
        let paths: Vec<PathBuf> = self
            .buffers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let result = tokio::time::timeout(SHUTDOWN_FLUSH_BUDGET, async {
            for path in &paths {
                if let Err(e) = self.flush_workspace(path).await {
                    error!("shutdown flush for {} failed: {e}", path.display());
                }
            }
        })
        .await;

        if result.is_err() {
            let abandoned: usize = {
                let mut total = 0;
                for entry in self.buffers.iter() {
                    if let Ok(guard) = entry.value().try_lock() {
                        total += guard.pending.len();
                    }
                }
                total
            };
            warn!("shutdown flush budget exhausted; {abandoned} documents abandoned");
        }
    }

    /// Documents successfully flushed since startup.
    pub fn flushed_count(&self) -> u64 {
        self.flushed_docs.load(Ordering::Relaxed)
    }

    /// Documents currently buffered for one workspace.
    pub async fn pending_count(&self, index_path: &PathBuf) -> usize {
        self.buffer_for(index_path).lock().await.pending.len()
    }

    fn effective_batch_size(&self) -> usize {
        self.monitor.recommended_batch_size(self.batch_size)
    }

    fn buffer_for(&self, index_path: &PathBuf) -> Arc<Mutex<Buffer>> {
        self.buffers
            .entry(index_path.clone())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::FileDocument;
    use crate::monitor::PressureLevel;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Arc<BatchIndexer>, Arc<LexicalIndexManager>) {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default();
        let manager = Arc::new(LexicalIndexManager::new(&settings));
        let monitor = Arc::new(MemoryPressureMonitor::new(&settings));
        let indexer = Arc::new(BatchIndexer::new(&settings, Arc::clone(&manager), monitor));
        (dir, indexer, manager)
    }

    fn doc_for(manager: &LexicalIndexManager, path: &std::path::Path, id: &str, content: &str) -> Document {
        let entry = manager.get_or_open(path).unwrap();
        FileDocument {
            path: id.to_string(),
            content: content.to_string(),
            symbols: Vec::new(),
            size_bytes: content.len() as u64,
            modified_ms: 1,
        }
        .into_document(entry.schema())
    }

    #[tokio::test]
    async fn documents_are_buffered_until_flush() {
        let (dir, indexer, manager) = fixture();
        let index_path = dir.path().to_path_buf();

        let doc = doc_for(&manager, &index_path, "a.txt", "buffered words");
        indexer
            .add_document(&index_path, "a.txt".into(), doc)
            .await
            .unwrap();
        assert_eq!(indexer.pending_count(&index_path).await, 1);

        // Nothing visible before the flush commits.
        let entry = manager.get_or_open(&index_path).unwrap();
        assert_eq!(entry.num_docs().unwrap(), 0);

        indexer.flush_workspace(&index_path).await.unwrap();
        assert_eq!(indexer.pending_count(&index_path).await, 0);
        assert_eq!(entry.num_docs().unwrap(), 1);
        assert_eq!(indexer.flushed_count(), 1);
    }

    #[tokio::test]
    async fn later_update_for_same_id_wins() {
        let (dir, indexer, manager) = fixture();
        let index_path = dir.path().to_path_buf();

        let first = doc_for(&manager, &index_path, "a.txt", "version one");
        let second = doc_for(&manager, &index_path, "a.txt", "version two");
        indexer
            .add_document(&index_path, "a.txt".into(), first)
            .await
            .unwrap();
        indexer
            .add_document(&index_path, "a.txt".into(), second)
            .await
            .unwrap();
        indexer.flush_workspace(&index_path).await.unwrap();

        let entry = manager.get_or_open(&index_path).unwrap();
        assert_eq!(entry.num_docs().unwrap(), 1);
        assert!(entry.search("one", 10).unwrap().is_empty());
        assert_eq!(entry.search("two", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn flush_is_idempotent_per_document() {
        let (dir, indexer, manager) = fixture();
        let index_path = dir.path().to_path_buf();

        let doc = doc_for(&manager, &index_path, "a.txt", "repeatable");
        indexer
            .add_document(&index_path, "a.txt".into(), doc.clone())
            .await
            .unwrap();
        indexer.flush_workspace(&index_path).await.unwrap();

        // Replaying the same (id, document) pair yields the same state.
        indexer
            .add_document(&index_path, "a.txt".into(), doc)
            .await
            .unwrap();
        indexer.flush_workspace(&index_path).await.unwrap();

        let entry = manager.get_or_open(&index_path).unwrap();
        assert_eq!(entry.num_docs().unwrap(), 1);
    }

    #[tokio::test]
    async fn pressure_rejects_new_work() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default();
        let manager = Arc::new(LexicalIndexManager::new(&settings));
        let monitor = Arc::new(MemoryPressureMonitor::new(&settings));
        monitor.force_level(PressureLevel::High);
        let indexer = Arc::new(BatchIndexer::new(
            &settings,
            Arc::clone(&manager),
            Arc::clone(&monitor),
        ));

        let index_path = dir.path().to_path_buf();
        let doc = doc_for(&manager, &index_path, "a.txt", "rejected");
        let err = indexer
            .add_document(&index_path, "a.txt".into(), doc)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted { .. }));
    }
}
