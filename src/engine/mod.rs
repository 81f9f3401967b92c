//! The engine facade: one coordinator per workspace, shared ambient
//! services.
//!
//! Per-workspace state (symbol database, lexical index, watcher) is owned by
//! a single coordinator entry; everything else (registry, batch indexer,
//! query cache, pressure monitor, memory stores) is process-wide and
//! injected by handle, never reached ambiently.

use dashmap::DashMap;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::index::batch::BatchIndexer;
use crate::index::cache::QueryCache;
use crate::index::manager::{IndexStatistics, LexicalIndexManager, TextHit};
use crate::indexing::pipeline::{IndexStats, IndexingPipeline, WorkspaceHandles};
use crate::memory::MemoryStores;
use crate::monitor::{MemoryPressureMonitor, OpKind};
use crate::search::callpath::{CallPathNode, CallPathTracer};
use crate::search::context::SearchContext;
use crate::search::hybrid::{HybridResults, HybridSearch};
use crate::storage::SymbolDb;
use crate::types::{Identifier, Symbol, TraceDirection};
use crate::watcher::WorkspaceWatcher;
use crate::workspace::registry::{WorkspaceEntry, WorkspaceRegistry, WorkspaceStatus};
use crate::workspace::resolver::PathResolver;

/// Result of a semantic symbol query; `available == false` carries the
/// degradation signal instead of an error.
#[derive(Debug, serde::Serialize)]
pub struct SemanticSearchOutcome {
    pub available: bool,
    pub results: Vec<(Symbol, f32)>,
}

/// Process-wide engine handle.
pub struct Engine {
    settings: Arc<Settings>,
    resolver: PathResolver,
    registry: Arc<WorkspaceRegistry>,
    manager: Arc<LexicalIndexManager>,
    batch: Arc<BatchIndexer>,
    cache: Arc<QueryCache>,
    monitor: Arc<MemoryPressureMonitor>,
    pipeline: Arc<IndexingPipeline>,
    embedding: Arc<EmbeddingProvider>,
    memory: Arc<MemoryStores>,
    context: Arc<SearchContext>,
    workspaces: DashMap<String, Arc<WorkspaceHandles>>,
    watchers: DashMap<String, WorkspaceWatcher>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Build the engine and start background services (pressure sampler,
    /// batch age timer).
    pub async fn new(settings: Settings) -> EngineResult<Arc<Self>> {
        let settings = Arc::new(settings);
        let resolver = PathResolver::new(&settings.index.base_path);
        let registry = Arc::new(WorkspaceRegistry::load(resolver.clone()).await?);
        let manager = Arc::new(LexicalIndexManager::new(&settings));
        let monitor = Arc::new(MemoryPressureMonitor::new(&settings));
        let batch = Arc::new(BatchIndexer::new(
            &settings,
            Arc::clone(&manager),
            Arc::clone(&monitor),
        ));
        let cache = Arc::new(QueryCache::new(&settings));
        let embedding = Arc::new(EmbeddingProvider::new(&settings.embedding));
        let memory = Arc::new(MemoryStores::open(
            &resolver,
            Arc::clone(&embedding),
            settings.fusion.clone(),
        )?);
        let pipeline = Arc::new(IndexingPipeline::new(
            Arc::clone(&settings),
            Arc::clone(&manager),
            Arc::clone(&batch),
            Arc::clone(&monitor),
        ));
        let shutdown = CancellationToken::new();

        // Compaction under pressure: drop cached results and merge segments
        // opportunistically.
        {
            let cache = Arc::clone(&cache);
            monitor.set_compaction_hook(move || cache.clear_all());
        }
        let _sampler = monitor.start(shutdown.clone());
        let _age_timer = batch.start_maintenance(shutdown.clone());

        Ok(Arc::new(Self {
            settings,
            resolver,
            registry,
            manager,
            batch,
            cache,
            monitor,
            pipeline,
            embedding,
            memory,
            context: Arc::new(SearchContext::new()),
            workspaces: DashMap::new(),
            watchers: DashMap::new(),
            shutdown,
        }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    pub fn memory(&self) -> &MemoryStores {
        &self.memory
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    /// Register (if needed) and index a workspace, then keep it watched.
    pub async fn index_workspace(
        self: &Arc<Self>,
        path: &Path,
        force: bool,
    ) -> EngineResult<(String, IndexStats)> {
        let entry = self.registry.register(path).await?;
        let hash = entry.hash.clone();
        self.registry
            .update_status(&hash, WorkspaceStatus::Indexing)
            .await?;

        let handles = self.handles_for_entry(&entry)?;
        let result = self
            .pipeline
            .index_workspace(&handles, force, &self.shutdown.child_token())
            .await;

        match result {
            Ok(stats) => {
                let (doc_count, symbol_count) = {
                    let db = handles.db.lock().await;
                    (db.file_count()?, db.symbol_count()?)
                };
                let index_size = self
                    .manager
                    .statistics(&handles.index_path)
                    .map(|s| s.size_bytes)
                    .unwrap_or(0);
                self.registry
                    .update_statistics(&hash, doc_count, symbol_count, index_size)
                    .await?;
                self.registry
                    .update_status(&hash, WorkspaceStatus::Active)
                    .await?;
                self.cache.clear_workspace(&hash);
                self.ensure_watcher(&handles)?;
                Ok((hash, stats))
            }
            Err(e) => {
                self.registry
                    .update_status(&hash, WorkspaceStatus::Stale)
                    .await?;
                Err(e)
            }
        }
    }

    /// Full-text search over one workspace's lexical index.
    pub async fn text_search(
        &self,
        path: &Path,
        query: &str,
        limit: usize,
    ) -> EngineResult<Vec<TextHit>> {
        if self.monitor.should_throttle(OpKind::TextSearch) {
            return Err(EngineError::ResourceExhausted {
                reason: "memory pressure: search is paused".into(),
            });
        }
        let handles = self.lookup_handles(path).await?;
        self.context.record_query(query);

        let params = json!({"q": query, "limit": limit});
        if let Some(cached) = self.cache.get("text_search", &handles.hash, &params) {
            if let Ok(hits) = serde_json::from_value::<Vec<TextHit>>((*cached).clone()) {
                return Ok(hits);
            }
        }

        let entry = self.manager.get_searcher(&handles.index_path)?;
        let hits = entry.search(query, limit)?;
        if let Ok(value) = serde_json::to_value(&hits) {
            self.cache.put("text_search", &handles.hash, &params, value);
        }
        self.registry.update_last_accessed(&handles.hash).await.ok();
        Ok(hits)
    }

    pub async fn find_symbols(
        &self,
        path: &Path,
        name: &str,
        case_sensitive: bool,
    ) -> EngineResult<Vec<Symbol>> {
        let handles = self.lookup_handles(path).await?;
        let db = handles.db.lock().await;
        db.find_symbols_by_name(name, case_sensitive)
    }

    pub async fn find_references(&self, path: &Path, name: &str) -> EngineResult<Vec<Identifier>> {
        let handles = self.lookup_handles(path).await?;
        let db = handles.db.lock().await;
        db.find_identifiers_by_name(name, None, false)
    }

    pub async fn search_files(&self, path: &Path, pattern: &str) -> EngineResult<Vec<String>> {
        let handles = self.lookup_handles(path).await?;
        let db = handles.db.lock().await;
        db.search_files_by_pattern(pattern)
    }

    pub async fn grep(
        &self,
        path: &Path,
        query: &str,
        limit: usize,
    ) -> EngineResult<Vec<(String, String)>> {
        let handles = self.lookup_handles(path).await?;
        let db = handles.db.lock().await;
        db.search_file_content(query, limit)
    }

    /// Trace who calls / what is called by a symbol name.
    pub async fn trace_call_path(
        &self,
        path: &Path,
        name: &str,
        direction: Option<TraceDirection>,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathNode>> {
        let handles = self.lookup_handles(path).await?;
        let tracer = CallPathTracer::new(Arc::clone(&handles.db), Arc::clone(&self.embedding));
        match direction {
            Some(TraceDirection::Upward) => {
                tracer.trace_upward(name, max_depth, case_sensitive).await
            }
            Some(TraceDirection::Downward) => {
                tracer.trace_downward(name, max_depth, case_sensitive).await
            }
            None => tracer.trace_both(name, max_depth, case_sensitive).await,
        }
    }

    /// Hybrid lexical + semantic search with rank fusion.
    pub async fn hybrid_search(
        &self,
        path: &Path,
        query: &str,
        max_results: usize,
    ) -> EngineResult<HybridResults> {
        let handles = self.lookup_handles(path).await?;
        self.context.record_query(query);
        let entry = self.manager.get_searcher(&handles.index_path)?;
        let search = HybridSearch::new(self.settings.fusion.clone(), Arc::clone(&self.embedding));
        search.search(&entry, &handles.db, query, max_results).await
    }

    /// Semantic symbol search. Unavailable vectors yield an empty result
    /// with `available == false`, never an error.
    pub async fn semantic_symbol_search(
        &self,
        path: &Path,
        query: &str,
        k: usize,
    ) -> EngineResult<SemanticSearchOutcome> {
        let handles = self.lookup_handles(path).await?;
        if !self.embedding.is_available() {
            return Ok(SemanticSearchOutcome {
                available: false,
                results: Vec::new(),
            });
        }
        let vector = match self.embedding.embed_one(query).await {
            Ok(vector) => vector,
            Err(_) => {
                return Ok(SemanticSearchOutcome {
                    available: false,
                    results: Vec::new(),
                });
            }
        };
        let db = handles.db.lock().await;
        Ok(SemanticSearchOutcome {
            available: true,
            results: db.nearest_symbols(&vector, k)?,
        })
    }

    /// Embed all symbols that do not have embeddings yet.
    pub async fn embed_workspace(&self, path: &Path) -> EngineResult<usize> {
        let handles = self.lookup_handles(path).await?;
        self.embedding
            .embed_missing_symbols(&handles.db, &self.monitor)
            .await
    }

    pub async fn list_workspaces(&self) -> Vec<WorkspaceEntry> {
        self.registry.list().await
    }

    pub async fn index_info(&self, path: &Path) -> EngineResult<(WorkspaceEntry, IndexStatistics)> {
        let handles = self.lookup_handles(path).await?;
        let entry = self
            .registry
            .get_by_hash(&handles.hash)
            .await
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {}", handles.hash),
            })?;
        let stats = self.manager.statistics(&handles.index_path)?;
        Ok((entry, stats))
    }

    pub async fn unregister_workspace(&self, hash: &str) -> EngineResult<()> {
        if let Some((_, watcher)) = self.watchers.remove(hash) {
            watcher.abort();
        }
        self.workspaces.remove(hash);
        self.cache.clear_workspace(hash);
        self.registry.unregister(hash).await
    }

    /// Flush, commit, and stop background services. Bounded by the 30 s
    /// budgets in the batch indexer and the index manager.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        self.shutdown.cancel();
        for watcher in self.watchers.iter() {
            watcher.abort();
        }
        self.batch.shutdown().await;
        self.manager.shutdown();
    }

    /// Handles for an already-registered workspace.
    async fn lookup_handles(&self, path: &Path) -> EngineResult<Arc<WorkspaceHandles>> {
        let entry = self
            .registry
            .get_by_path(path)
            .await
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {}", path.display()),
            })?;
        self.handles_for_entry(&entry)
    }

    fn handles_for_entry(&self, entry: &WorkspaceEntry) -> EngineResult<Arc<WorkspaceHandles>> {
        if let Some(handles) = self.workspaces.get(&entry.hash) {
            return Ok(Arc::clone(&handles));
        }
        let db_path = self.resolver.symbol_db_path(&entry.hash);
        let db = match SymbolDb::open(&db_path) {
            Ok(db) => db,
            Err(e)
                if matches!(e.kind(), ErrorKind::SchemaMismatch | ErrorKind::IndexCorrupt) =>
            {
                warn!(
                    "symbol db at {} unusable ({e}); clearing for rebuild",
                    db_path.display()
                );
                std::fs::remove_file(&db_path)?;
                let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
                let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
                SymbolDb::open(&db_path)?
            }
            Err(e) => return Err(e),
        };
        let handles = Arc::new(WorkspaceHandles {
            root: entry.path.clone(),
            hash: entry.hash.clone(),
            index_path: self.resolver.lexical_index_path(&entry.hash),
            db: Arc::new(Mutex::new(db)),
        });
        self.workspaces
            .insert(entry.hash.clone(), Arc::clone(&handles));
        Ok(handles)
    }

    fn ensure_watcher(&self, handles: &Arc<WorkspaceHandles>) -> EngineResult<()> {
        if !self.settings.watcher.enabled || self.watchers.contains_key(&handles.hash) {
            return Ok(());
        }
        let watcher = WorkspaceWatcher::start(
            Arc::clone(&self.settings),
            Arc::clone(&self.pipeline),
            (**handles).clone(),
            Arc::clone(&self.cache),
            self.shutdown.child_token(),
        )?;
        self.watchers.insert(handles.hash.clone(), watcher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine_settings(base: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.index.base_path = base.path().to_path_buf();
        settings.watcher.enabled = false;
        settings
    }

    #[tokio::test]
    async fn index_then_search_end_to_end() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "hello world\nfoo").unwrap();
        std::fs::write(ws.path().join("b.txt"), "hello kitten").unwrap();

        let engine = Engine::new(engine_settings(&base)).await.unwrap();
        let (hash, stats) = engine.index_workspace(ws.path(), true).await.unwrap();
        assert_eq!(stats.files_indexed, 2);

        let hits = engine.text_search(ws.path(), "hello", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        let kitten = engine.text_search(ws.path(), "kitten", 10).await.unwrap();
        assert_eq!(kitten.len(), 1);
        assert_eq!(kitten[0].path, "b.txt");
        // Fuzzy single-term query.
        let fuzzy = engine.text_search(ws.path(), "kittie~", 10).await.unwrap();
        assert_eq!(fuzzy.len(), 1);

        let entry = engine.registry().get_by_hash(&hash).await.unwrap();
        assert_eq!(entry.status, WorkspaceStatus::Active);
        assert_eq!(entry.document_count, 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn unindexed_workspace_is_not_found() {
        let base = TempDir::new().unwrap();
        let engine = Engine::new(engine_settings(&base)).await.unwrap();
        let err = engine
            .text_search(Path::new("/nowhere/special"), "x", 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn hybrid_search_falls_back_without_provider() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("auth.txt"), "authentication middleware").unwrap();

        let engine = Engine::new(engine_settings(&base)).await.unwrap();
        engine.index_workspace(ws.path(), true).await.unwrap();

        let results = engine
            .hybrid_search(ws.path(), "authentication", 10)
            .await
            .unwrap();
        assert_eq!(results.merge_strategy, "LexicalOnly-Fallback");
        assert_eq!(results.hits.len(), 1);
        assert!(results.hits[0].lexical_score.is_some());

        let semantic = engine
            .semantic_symbol_search(ws.path(), "authentication", 5)
            .await
            .unwrap();
        assert!(!semantic.available);
        assert!(semantic.results.is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn unregister_cleans_up() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "content").unwrap();

        let engine = Engine::new(engine_settings(&base)).await.unwrap();
        let (hash, _) = engine.index_workspace(ws.path(), true).await.unwrap();
        engine.unregister_workspace(&hash).await.unwrap();
        assert!(engine.registry().get_by_hash(&hash).await.is_none());
        engine.shutdown().await;
    }
}
