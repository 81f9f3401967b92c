//! Filesystem watcher driving incremental re-indexing.
//!
//! Platform notifications land on a crossbeam channel from notify's callback
//! thread; an async loop drains the channel into the per-path debouncer and
//! replays the pipeline for paths that settle. Events for the same path are
//! coalesced, the latest wins.

pub mod debouncer;

use crossbeam_channel::{Receiver, unbounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::index::cache::QueryCache;
use crate::indexing::pipeline::{IndexingPipeline, WorkspaceHandles, relative_path};
use crate::indexing::walker::FileWalker;
use crate::storage::GlobMatcher;

pub use debouncer::{Debouncer, FileEvent};

/// Channel drain cadence; also bounds added latency on top of the debounce
/// window.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Watches one workspace root and keeps its indexes current.
pub struct WorkspaceWatcher {
    // Held to keep the platform watcher registered.
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl WorkspaceWatcher {
    /// Register platform notifications for the workspace root and start the
    /// processing loop.
    pub fn start(
        settings: Arc<Settings>,
        pipeline: Arc<IndexingPipeline>,
        handles: WorkspaceHandles,
        cache: Arc<QueryCache>,
        shutdown: CancellationToken,
    ) -> EngineResult<Self> {
        let (tx, rx) = unbounded();
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                let _ = tx.send(result);
            })
            .map_err(|e| EngineError::Fatal(format!("failed to create watcher: {e}")))?;
        watcher
            .watch(&handles.root, RecursiveMode::Recursive)
            .map_err(|e| EngineError::Fatal(format!("failed to watch workspace root: {e}")))?;

        let exclusions = match GlobMatcher::compile(&settings.indexing.ignore_patterns.join(",")) {
            Ok(matcher) => Some(matcher),
            Err(_) => None,
        };
        let walker = FileWalker::new(Arc::clone(&settings));
        let debounce_ms = settings.watcher.debounce_ms;

        let task = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(debounce_ms);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("watcher for {} stopped", handles.root.display());
                        return;
                    }
                    _ = tokio::time::sleep(POLL_INTERVAL) => {
                        drain_channel(
                            &rx,
                            &mut debouncer,
                            &walker,
                            exclusions.as_ref(),
                            &handles,
                        );
                        for (path, event) in debouncer.take_ready() {
                            apply_event(&pipeline, &cache, &handles, &path, event).await;
                        }
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

fn drain_channel(
    rx: &Receiver<Result<Event, notify::Error>>,
    debouncer: &mut Debouncer,
    walker: &FileWalker,
    exclusions: Option<&GlobMatcher>,
    handles: &WorkspaceHandles,
) {
    while let Ok(result) = rx.try_recv() {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!("watch error: {e}");
                continue;
            }
        };
        let file_event = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => FileEvent::Changed,
            EventKind::Remove(_) => FileEvent::Removed,
            _ => continue,
        };
        for path in event.paths {
            if !accepts(walker, exclusions, handles, &path, file_event) {
                continue;
            }
            debouncer.record(path, file_event);
        }
    }
}

/// Exclusion patterns and the extension filter apply before enqueueing.
fn accepts(
    walker: &FileWalker,
    exclusions: Option<&GlobMatcher>,
    handles: &WorkspaceHandles,
    path: &Path,
    event: FileEvent,
) -> bool {
    // A removed path has no extension requirement relaxations: it must still
    // look like a source file we would have indexed.
    if walker.language_of(path).is_none() {
        return false;
    }
    if event == FileEvent::Changed && !path.is_file() {
        return false;
    }
    if let Some(matcher) = exclusions {
        let rel = relative_path(&handles.root, path);
        if matcher.is_match(&rel) {
            return false;
        }
    }
    true
}

async fn apply_event(
    pipeline: &IndexingPipeline,
    cache: &QueryCache,
    handles: &WorkspaceHandles,
    path: &Path,
    event: FileEvent,
) {
    let outcome = match event {
        FileEvent::Changed => pipeline.index_file(handles, path).await,
        FileEvent::Removed => pipeline.remove_file(handles, path).await,
    };
    match outcome {
        Ok(()) => {
            cache.clear_workspace(&handles.hash);
            crate::log_event!("watcher", "applied", "{:?} {}", event, path.display());
        }
        Err(e) => warn!("watcher update for {} failed: {e}", path.display()),
    }
}
