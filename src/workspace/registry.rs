//! Durable catalog of known workspaces and orphaned index directories.
//!
//! The registry is a single JSON document loaded once, cached in memory, and
//! saved atomically (write-temp + rename). It is the authority for "does this
//! workspace exist". Mutations serialize on an exclusive async lock; reads go
//! through the cache.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::workspace::resolver::PathResolver;

/// Orphan directories are deleted this long after being recorded.
const ORPHAN_GRACE_PERIOD_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Name of the legacy per-workspace metadata file, consumed by migration.
const LEGACY_METADATA_FILE: &str = "workspace_metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Indexing,
    Stale,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    /// Original path as registered, before normalization.
    pub path: PathBuf,
    pub hash: String,
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub symbol_count: u64,
    #[serde(default)]
    pub index_size_bytes: u64,
    pub created_ms: u64,
    #[serde(default)]
    pub last_indexed_ms: u64,
    #[serde(default)]
    pub last_accessed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedIndex {
    /// Index directory with no owning workspace.
    pub directory: PathBuf,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_path: Option<PathBuf>,
    pub recorded_ms: u64,
}

impl OrphanedIndex {
    pub fn ready_for_cleanup(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.recorded_ms) >= ORPHAN_GRACE_PERIOD_MS
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    workspaces: IndexMap<String, WorkspaceEntry>,
    #[serde(default)]
    orphans: Vec<OrphanedIndex>,
}

/// Process-wide durable mapping from workspace hash to entry.
pub struct WorkspaceRegistry {
    resolver: PathResolver,
    state: RwLock<RegistryDocument>,
}

impl WorkspaceRegistry {
    /// Load the registry document, running legacy migration when the file is
    /// missing but per-workspace metadata exists.
    pub async fn load(resolver: PathResolver) -> EngineResult<Self> {
        let registry_path = resolver.registry_path();
        let document = if registry_path.exists() {
            let raw = std::fs::read_to_string(&registry_path).map_err(|e| {
                EngineError::FileRead {
                    path: registry_path.clone(),
                    source: e,
                }
            })?;
            serde_json::from_str(&raw).map_err(|e| EngineError::RegistrySave {
                reason: format!("registry document unreadable: {e}"),
            })?
        } else {
            Self::migrate_from_legacy_metadata(&resolver)?
        };

        let registry = Self {
            resolver,
            state: RwLock::new(document),
        };
        registry.mark_missing_indexes_stale().await?;
        Ok(registry)
    }

    /// Register a workspace path, creating its entry when absent.
    ///
    /// Two distinct paths collapsing to one hash is a configuration error.
    pub async fn register(&self, path: &Path) -> EngineResult<WorkspaceEntry> {
        let canonical = self.resolver.canonicalize(path);
        let hash = self.resolver.workspace_hash(&canonical);
        let now = now_ms();

        let mut state = self.state.write().await;
        if let Some(existing) = state.workspaces.get_mut(&hash) {
            if existing.path != canonical {
                return Err(EngineError::InvalidArgument {
                    reason: format!(
                        "workspace hash collision: '{}' and '{}' both map to {hash}",
                        existing.path.display(),
                        canonical.display()
                    ),
                });
            }
            existing.last_accessed_ms = now;
            let entry = existing.clone();
            self.save_locked(&state)?;
            return Ok(entry);
        }

        let entry = WorkspaceEntry {
            path: canonical,
            hash: hash.clone(),
            status: WorkspaceStatus::Active,
            document_count: 0,
            symbol_count: 0,
            index_size_bytes: 0,
            created_ms: now,
            last_indexed_ms: 0,
            last_accessed_ms: now,
        };
        state.workspaces.insert(hash, entry.clone());
        self.save_locked(&state)?;
        Ok(entry)
    }

    /// Remove a workspace. Its index directory is deleted, or recorded as an
    /// orphan when deletion fails, within this same call.
    pub async fn unregister(&self, hash: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .workspaces
            .shift_remove(hash)
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {hash}"),
            })?;

        let index_root = self.resolver.index_root(hash);
        let db_path = self.resolver.symbol_db_path(hash);
        let _ = std::fs::remove_file(&db_path);
        if index_root.exists() {
            if let Err(e) = std::fs::remove_dir_all(&index_root) {
                warn!(
                    "could not delete index dir {}: {e}; recording orphan",
                    index_root.display()
                );
                state.orphans.push(OrphanedIndex {
                    directory: index_root,
                    reason: format!("unregister of {} could not delete directory", hash),
                    attempted_path: Some(entry.path),
                    recorded_ms: now_ms(),
                });
            }
        }
        self.save_locked(&state)
    }

    pub async fn get_by_hash(&self, hash: &str) -> Option<WorkspaceEntry> {
        self.state.read().await.workspaces.get(hash).cloned()
    }

    pub async fn get_by_path(&self, path: &Path) -> Option<WorkspaceEntry> {
        let canonical = self.resolver.canonicalize(path);
        let hash = self.resolver.workspace_hash(&canonical);
        self.get_by_hash(&hash).await
    }

    /// Look up by the final path segment of the workspace root.
    pub async fn get_by_directory_name(&self, name: &str) -> Option<WorkspaceEntry> {
        let state = self.state.read().await;
        state
            .workspaces
            .values()
            .find(|entry| {
                entry
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy() == name)
                    .unwrap_or(false)
            })
            .cloned()
    }

    pub async fn list(&self) -> Vec<WorkspaceEntry> {
        self.state.read().await.workspaces.values().cloned().collect()
    }

    pub async fn update_status(&self, hash: &str, status: WorkspaceStatus) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .workspaces
            .get_mut(hash)
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {hash}"),
            })?;
        entry.status = status;
        self.save_locked(&state)
    }

    pub async fn update_statistics(
        &self,
        hash: &str,
        document_count: u64,
        symbol_count: u64,
        index_size_bytes: u64,
    ) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .workspaces
            .get_mut(hash)
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {hash}"),
            })?;
        entry.document_count = document_count;
        entry.symbol_count = symbol_count;
        entry.index_size_bytes = index_size_bytes;
        entry.last_indexed_ms = now_ms();
        self.save_locked(&state)
    }

    pub async fn update_last_accessed(&self, hash: &str) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .workspaces
            .get_mut(hash)
            .ok_or_else(|| EngineError::NotFound {
                entity: format!("workspace {hash}"),
            })?;
        entry.last_accessed_ms = now_ms();
        self.save_locked(&state)
    }

    /// Record an orphaned index directory. The directory must exist at the
    /// moment it is recorded.
    pub async fn mark_orphaned(
        &self,
        directory: PathBuf,
        reason: impl Into<String>,
        attempted_path: Option<PathBuf>,
    ) -> EngineResult<()> {
        if !directory.exists() {
            return Err(EngineError::InvalidArgument {
                reason: format!(
                    "cannot record orphan: '{}' does not exist",
                    directory.display()
                ),
            });
        }
        let mut state = self.state.write().await;
        if state.orphans.iter().any(|o| o.directory == directory) {
            return Ok(());
        }
        state.orphans.push(OrphanedIndex {
            directory,
            reason: reason.into(),
            attempted_path,
            recorded_ms: now_ms(),
        });
        self.save_locked(&state)
    }

    pub async fn list_orphans(&self) -> Vec<OrphanedIndex> {
        self.state.read().await.orphans.clone()
    }

    /// Orphans past the 7-day grace period.
    pub async fn list_orphans_ready_for_cleanup(&self) -> Vec<OrphanedIndex> {
        let now = now_ms();
        self.state
            .read()
            .await
            .orphans
            .iter()
            .filter(|o| o.ready_for_cleanup(now))
            .cloned()
            .collect()
    }

    /// Delete orphan directories past the grace period. Returns how many
    /// were removed. Directories that fail to delete stay recorded.
    pub async fn cleanup_orphans(&self) -> EngineResult<usize> {
        let now = now_ms();
        let mut state = self.state.write().await;
        let mut removed = 0;
        state.orphans.retain(|orphan| {
            if !orphan.ready_for_cleanup(now) {
                return true;
            }
            match std::fs::remove_dir_all(&orphan.directory) {
                Ok(()) => {
                    info!("removed orphaned index {}", orphan.directory.display());
                    removed += 1;
                    false
                }
                Err(_) if !orphan.directory.exists() => {
                    removed += 1;
                    false
                }
                Err(e) => {
                    warn!(
                        "orphan cleanup failed for {}: {e}",
                        orphan.directory.display()
                    );
                    true
                }
            }
        });
        self.save_locked(&state)?;
        Ok(removed)
    }

    /// Assemble a registry from legacy per-workspace metadata files.
    ///
    /// Runs when no registry document exists. Index directories without
    /// readable metadata become orphans. Idempotent: a second run over the
    /// same tree produces the same document.
    fn migrate_from_legacy_metadata(resolver: &PathResolver) -> EngineResult<RegistryDocument> {
        let mut document = RegistryDocument::default();
        let index_base = resolver.base_path().join("index");
        if !index_base.is_dir() {
            return Ok(document);
        }

        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let backup_dir = resolver.backup_path(&stamp);
        let now = now_ms();

        for dir_entry in std::fs::read_dir(&index_base)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            let metadata_path = path.join(LEGACY_METADATA_FILE);
            let legacy: Option<LegacyMetadata> = std::fs::read_to_string(&metadata_path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok());

            match legacy {
                Some(meta) => {
                    let hash = resolver.workspace_hash(&meta.workspace_path);
                    document.workspaces.insert(
                        hash.clone(),
                        WorkspaceEntry {
                            path: meta.workspace_path,
                            hash,
                            status: WorkspaceStatus::Active,
                            document_count: meta.document_count,
                            symbol_count: 0,
                            index_size_bytes: 0,
                            created_ms: meta.created_ms.unwrap_or(now),
                            last_indexed_ms: meta.last_indexed_ms.unwrap_or(0),
                            last_accessed_ms: now,
                        },
                    );
                    // Snapshot the consumed metadata file; the original stays
                    // in place so a re-run assembles the same document.
                    if std::fs::create_dir_all(&backup_dir).is_ok() {
                        let backup_file = backup_dir.join(format!(
                            "{}-{LEGACY_METADATA_FILE}",
                            dir_entry.file_name().to_string_lossy()
                        ));
                        let _ = std::fs::copy(&metadata_path, backup_file);
                    }
                }
                None => {
                    info!(
                        "index directory without metadata recorded as orphan: {}",
                        path.display()
                    );
                    document.orphans.push(OrphanedIndex {
                        directory: path,
                        reason: "no owning workspace metadata found during migration".into(),
                        attempted_path: None,
                        recorded_ms: now,
                    });
                }
            }
        }

        Ok(document)
    }

    /// Workspaces whose index directory vanished are marked stale.
    async fn mark_missing_indexes_stale(&self) -> EngineResult<()> {
        let mut state = self.state.write().await;
        let mut changed = false;
        for entry in state.workspaces.values_mut() {
            if entry.status == WorkspaceStatus::Active
                && !self.resolver.index_root(&entry.hash).exists()
                && !self.resolver.symbol_db_path(&entry.hash).exists()
            {
                entry.status = WorkspaceStatus::Stale;
                changed = true;
            }
        }
        if changed {
            self.save_locked(&state)?;
        }
        Ok(())
    }

    /// Atomic save: write temp, then rename. Failures are fatal to the
    /// enclosing mutation.
    fn save_locked(&self, state: &RegistryDocument) -> EngineResult<()> {
        let registry_path = self.resolver.registry_path();
        if let Some(parent) = registry_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::RegistrySave {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let serialized =
            serde_json::to_string_pretty(state).map_err(|e| EngineError::RegistrySave {
                reason: e.to_string(),
            })?;
        let temp_path = registry_path.with_extension("json.tmp");
        std::fs::write(&temp_path, serialized).map_err(|e| EngineError::RegistrySave {
            reason: format!("write {}: {e}", temp_path.display()),
        })?;
        std::fs::rename(&temp_path, &registry_path).map_err(|e| EngineError::RegistrySave {
            reason: format!("rename into {}: {e}", registry_path.display()),
        })?;
        Ok(())
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}

/// Legacy metadata shape, one file per index directory.
#[derive(Debug, Deserialize)]
struct LegacyMetadata {
    workspace_path: PathBuf,
    #[serde(default)]
    document_count: u64,
    #[serde(default)]
    created_ms: Option<u64>,
    #[serde(default)]
    last_indexed_ms: Option<u64>,
}

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn registry_in(dir: &TempDir) -> WorkspaceRegistry {
        WorkspaceRegistry::load(PathResolver::new(dir.path()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        let registry = registry_in(&base).await;

        let entry = registry.register(ws.path()).await.unwrap();
        assert_eq!(entry.status, WorkspaceStatus::Active);

        let by_hash = registry.get_by_hash(&entry.hash).await.unwrap();
        assert_eq!(by_hash.path, entry.path);

        let by_path = registry.get_by_path(ws.path()).await.unwrap();
        assert_eq!(by_path.hash, entry.hash);
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        let registry = registry_in(&base).await;

        let first = registry.register(ws.path()).await.unwrap();
        let second = registry.register(ws.path()).await.unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn registry_persists_across_loads() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        let hash = {
            let registry = registry_in(&base).await;
            registry.register(ws.path()).await.unwrap().hash
        };

        let reloaded = registry_in(&base).await;
        assert!(reloaded.get_by_hash(&hash).await.is_some());
    }

    #[tokio::test]
    async fn unregister_removes_index_dir() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        let registry = registry_in(&base).await;

        let entry = registry.register(ws.path()).await.unwrap();
        let index_root = registry.resolver().index_root(&entry.hash);
        std::fs::create_dir_all(&index_root).unwrap();
        std::fs::write(index_root.join("meta.json"), "{}").unwrap();

        registry.unregister(&entry.hash).await.unwrap();
        assert!(!index_root.exists());
        assert!(registry.get_by_hash(&entry.hash).await.is_none());
    }

    #[tokio::test]
    async fn orphan_requires_existing_directory() {
        let base = TempDir::new().unwrap();
        let registry = registry_in(&base).await;

        let missing = base.path().join("nope");
        assert!(registry
            .mark_orphaned(missing, "test", None)
            .await
            .is_err());

        let present = base.path().join("present");
        std::fs::create_dir_all(&present).unwrap();
        registry
            .mark_orphaned(present.clone(), "test", None)
            .await
            .unwrap();
        assert_eq!(registry.list_orphans().await.len(), 1);
        // Fresh orphans are inside the grace period.
        assert!(registry.list_orphans_ready_for_cleanup().await.is_empty());
    }

    #[tokio::test]
    async fn statistics_update_round_trips() {
        let base = TempDir::new().unwrap();
        let ws = TempDir::new().unwrap();
        let registry = registry_in(&base).await;

        let entry = registry.register(ws.path()).await.unwrap();
        registry
            .update_statistics(&entry.hash, 12, 34, 5678)
            .await
            .unwrap();

        let updated = registry.get_by_hash(&entry.hash).await.unwrap();
        assert_eq!(updated.document_count, 12);
        assert_eq!(updated.symbol_count, 34);
        assert_eq!(updated.index_size_bytes, 5678);
        assert!(updated.last_indexed_ms > 0);
    }

    #[tokio::test]
    async fn migration_assembles_registry_from_legacy_metadata() {
        let base = TempDir::new().unwrap();
        let index_base = base.path().join("index");

        // One directory with metadata, one dangling.
        let with_meta = index_base.join("aaaa000011112222");
        std::fs::create_dir_all(&with_meta).unwrap();
        std::fs::write(
            with_meta.join(LEGACY_METADATA_FILE),
            serde_json::json!({
                "workspace_path": "/home/user/project",
                "document_count": 7
            })
            .to_string(),
        )
        .unwrap();

        let dangling = index_base.join("bbbb000011112222");
        std::fs::create_dir_all(&dangling).unwrap();

        let registry = registry_in(&base).await;
        let workspaces = registry.list().await;
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].document_count, 7);
        assert_eq!(registry.list_orphans().await.len(), 1);
    }
}
