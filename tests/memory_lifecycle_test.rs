//! Memory store lifecycle: validation, persistence, relationships, search.

use std::sync::Arc;
use tempfile::TempDir;

use codescout::config::{EmbeddingConfig, FusionConfig};
use codescout::embedding::EmbeddingProvider;
use codescout::memory::{
    MemoryEntry, MemoryRelationKind, MemoryRelationship, MemoryStore, MemoryStores,
    validate_memory,
};
use codescout::workspace::resolver::PathResolver;

fn open_store(dir: &TempDir) -> MemoryStore {
    MemoryStore::open(
        dir.path(),
        Arc::new(EmbeddingProvider::new(&EmbeddingConfig::default())),
        FusionConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn stored_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = open_store(&dir);
        let mut entry = MemoryEntry::new("ArchitecturalDecision", "single writer per workspace");
        entry.is_shared = true;
        let (id, _) = store.store(entry).await.unwrap();
        id
    };

    let reopened = open_store(&dir);
    let fetched = reopened.get(&id).unwrap().unwrap();
    assert_eq!(fetched.entry_type, "ArchitecturalDecision");
    assert!(fetched.is_shared);
}

#[tokio::test]
async fn validation_gate_matches_validate_memory() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    // Every entry the validator accepts must be storable; every entry it
    // rejects must be refused.
    let mut good = MemoryEntry::new("Note", "short and sweet");
    good.fields
        .insert("sprint".into(), serde_json::json!(14));
    assert!(validate_memory(&good).is_valid());
    assert!(store.store(good).await.is_ok());

    let mut bad = MemoryEntry::new("Note", "fine content");
    bad.fields
        .insert("content".into(), serde_json::json!("reserved name"));
    assert!(!validate_memory(&bad).is_valid());
    assert!(store.store(bad).await.is_err());
}

#[tokio::test]
async fn access_stats_accumulate_across_reads() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (id, _) = store
        .store(MemoryEntry::new("Note", "count my reads"))
        .await
        .unwrap();

    for expected in 1..=3u64 {
        let entry = store.get(&id).unwrap().unwrap();
        assert_eq!(entry.access_count, expected);
    }
}

#[tokio::test]
async fn relationship_graph_walks_both_directions_for_symmetric_kinds() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (debt, _) = store
        .store(MemoryEntry::new("TechnicalDebt", "registry save is synchronous"))
        .await
        .unwrap();
    let (decision, _) = store
        .store(MemoryEntry::new(
            "ArchitecturalDecision",
            "keep registry mutations serialized",
        ))
        .await
        .unwrap();

    store
        .relate(&MemoryRelationship {
            from_id: decision.clone(),
            to_id: debt.clone(),
            kind: MemoryRelationKind::Resolves,
            bidirectional: false,
        })
        .unwrap();
    store
        .relate(&MemoryRelationship {
            from_id: decision.clone(),
            to_id: debt.clone(),
            kind: MemoryRelationKind::RelatedTo,
            bidirectional: false,
        })
        .unwrap();

    // Resolves is directed; relatedTo mirrors automatically.
    let from_decision = store.relationships_from(&decision).unwrap();
    assert_eq!(from_decision.len(), 2);
    let from_debt = store.relationships_from(&debt).unwrap();
    assert_eq!(from_debt.len(), 1);
    assert_eq!(from_debt[0].kind, MemoryRelationKind::RelatedTo);
}

#[tokio::test]
async fn search_covers_content_and_extended_fields() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut tagged = MemoryEntry::new("TechnicalDebt", "watcher leaks inotify handles");
    tagged
        .fields
        .insert("component".into(), serde_json::json!("watcher"));
    store.store(tagged).await.unwrap();
    store
        .store(MemoryEntry::new("Note", "unrelated shopping list"))
        .await
        .unwrap();

    let by_content = store.search("inotify", 10).await.unwrap();
    assert_eq!(by_content.len(), 1);

    let by_field = store.search("fields.component:watcher", 10).await.unwrap();
    assert_eq!(by_field.len(), 1);
}

#[tokio::test]
async fn project_and_local_are_separate_indexes() {
    let base = TempDir::new().unwrap();
    let resolver = PathResolver::new(base.path());
    let stores = MemoryStores::open(
        &resolver,
        Arc::new(EmbeddingProvider::new(&EmbeddingConfig::default())),
        FusionConfig::default(),
    )
    .unwrap();

    stores
        .store_for(true)
        .store(MemoryEntry::new("Note", "team-wide convention"))
        .await
        .unwrap();
    stores
        .store_for(false)
        .store(MemoryEntry::new("Note", "my private reminder"))
        .await
        .unwrap();

    assert_eq!(stores.project.count().unwrap(), 1);
    assert_eq!(stores.local.count().unwrap(), 1);
    assert!(
        stores
            .project
            .search("private", 10)
            .await
            .unwrap()
            .is_empty()
    );
}
