//! Writer-lock contention and batch-restore behavior across managers.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use codescout::Settings;
use codescout::error::EngineError;
use codescout::index::batch::BatchIndexer;
use codescout::index::manager::LexicalIndexManager;
use codescout::index::schema::FileDocument;
use codescout::monitor::MemoryPressureMonitor;

fn stack(settings: &Settings) -> (Arc<LexicalIndexManager>, Arc<BatchIndexer>) {
    let manager = Arc::new(LexicalIndexManager::new(settings));
    let monitor = Arc::new(MemoryPressureMonitor::new(settings));
    let batch = Arc::new(BatchIndexer::new(settings, Arc::clone(&manager), monitor));
    (manager, batch)
}

#[tokio::test]
async fn young_foreign_lock_fails_flush_and_restores_buffer() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::default();

    // First manager owns the writer: its lock is young and legitimate.
    let (holder_manager, _) = stack(&settings);
    let holder = holder_manager.get_writer(dir.path()).unwrap();
    let doc = FileDocument {
        path: "held.txt".into(),
        content: "writer held elsewhere".into(),
        symbols: Vec::new(),
        size_bytes: 21,
        modified_ms: 1,
    }
    .into_document(holder.schema());
    holder.update_document("held.txt", doc).unwrap();
    holder.commit().unwrap();

    // Second manager (fresh entry map, same directory) cannot take the
    // writer; the flush fails and the buffer keeps its documents in order.
    let (_other_manager, other_batch) = stack(&settings);
    let index_path = dir.path().to_path_buf();
    let pending = FileDocument {
        path: "queued.txt".into(),
        content: "waiting for the lock".into(),
        symbols: Vec::new(),
        size_bytes: 20,
        modified_ms: 2,
    }
    .into_document(holder.schema());
    other_batch
        .add_document(&index_path, "queued.txt".into(), pending)
        .await
        .unwrap();

    let err = other_batch.flush_workspace(&index_path).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexLocked { .. }));
    assert_eq!(other_batch.pending_count(&index_path).await, 1);
    assert_eq!(other_batch.flushed_count(), 0);
}

#[tokio::test]
async fn stale_lock_in_empty_dir_is_recovered() {
    let dir = TempDir::new().unwrap();
    // Plant a writer lock 20 minutes old in an otherwise-empty index dir.
    let lock_path = dir.path().join(".tantivy-writer.lock");
    std::fs::write(&lock_path, "").unwrap();
    let stale = std::time::SystemTime::now() - Duration::from_secs(20 * 60);
    let lock_file = std::fs::File::options()
        .write(true)
        .open(&lock_path)
        .unwrap();
    lock_file.set_modified(stale).unwrap();
    drop(lock_file);

    let settings = Settings::default();
    let (manager, batch) = stack(&settings);
    // get_writer succeeds: the stuck lock was cleared on open.
    let entry = manager.get_writer(dir.path()).unwrap();

    let doc = FileDocument {
        path: "fresh.txt".into(),
        content: "life after recovery".into(),
        symbols: Vec::new(),
        size_bytes: 19,
        modified_ms: 3,
    }
    .into_document(entry.schema());
    let index_path = dir.path().to_path_buf();
    batch
        .add_document(&index_path, "fresh.txt".into(), doc)
        .await
        .unwrap();
    batch.flush_workspace(&index_path).await.unwrap();

    assert_eq!(entry.search("recovery", 10).unwrap().len(), 1);
}

#[tokio::test]
async fn size_trigger_flushes_in_background() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.batch.size = 3;
    let (manager, batch) = stack(&settings);
    let index_path = dir.path().to_path_buf();
    let entry = manager.get_or_open(&index_path).unwrap();

    for i in 0..3 {
        let doc = FileDocument {
            path: format!("f{i}.txt"),
            content: format!("document number {i}"),
            symbols: Vec::new(),
            size_bytes: 18,
            modified_ms: i,
        }
        .into_document(entry.schema());
        batch
            .add_document(&index_path, format!("f{i}.txt"), doc)
            .await
            .unwrap();
    }

    // The third add crossed the threshold and scheduled a background flush.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if batch.flushed_count() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(batch.flushed_count(), 3);
    assert_eq!(entry.num_docs().unwrap(), 3);
}
