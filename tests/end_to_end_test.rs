//! End-to-end engine scenarios: index a workspace, query it, update it.

use std::sync::Arc;
use tempfile::TempDir;

use codescout::Settings;
use codescout::engine::Engine;
use codescout::workspace::registry::WorkspaceStatus;

fn settings_in(base: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.index.base_path = base.path().to_path_buf();
    settings.watcher.enabled = false;
    settings
}

async fn engine_in(base: &TempDir) -> Arc<Engine> {
    Engine::new(settings_in(base)).await.unwrap()
}

#[tokio::test]
async fn index_then_text_search() {
    let base = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    std::fs::write(ws.path().join("a.txt"), "hello world\nfoo").unwrap();
    std::fs::write(ws.path().join("b.txt"), "hello kitten").unwrap();

    let engine = engine_in(&base).await;
    let (_hash, stats) = engine.index_workspace(ws.path(), true).await.unwrap();
    assert_eq!(stats.files_indexed, 2);

    // Both files match "hello".
    let hello = engine.text_search(ws.path(), "hello", 10).await.unwrap();
    assert_eq!(hello.len(), 2);

    // Only b.txt matches "kitten", on line 1.
    let kitten = engine.text_search(ws.path(), "kitten", 10).await.unwrap();
    assert_eq!(kitten.len(), 1);
    assert_eq!(kitten[0].path, "b.txt");
    assert_eq!(kitten[0].lines, vec![(1, "hello kitten".to_string())]);

    // Fuzzy: a one-edit typo still reaches b.txt.
    let fuzzy = engine.text_search(ws.path(), "kittie~", 10).await.unwrap();
    assert_eq!(fuzzy.len(), 1);
    assert_eq!(fuzzy[0].path, "b.txt");

    engine.shutdown().await;
}

#[tokio::test]
async fn incremental_update_replaces_stale_content() {
    let base = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    let file = ws.path().join("a.txt");
    std::fs::write(&file, "hello world\nfoo").unwrap();

    let engine = engine_in(&base).await;
    engine.index_workspace(ws.path(), true).await.unwrap();
    assert_eq!(engine.text_search(ws.path(), "foo", 10).await.unwrap().len(), 1);

    std::fs::write(&file, "hello world\nbaz").unwrap();
    engine.index_workspace(ws.path(), true).await.unwrap();

    assert!(engine.text_search(ws.path(), "foo", 10).await.unwrap().is_empty());
    let baz = engine.text_search(ws.path(), "baz", 10).await.unwrap();
    assert_eq!(baz.len(), 1);
    assert_eq!(baz[0].path, "a.txt");
    assert_eq!(baz[0].lines, vec![(2, "baz".to_string())]);

    engine.shutdown().await;
}

#[tokio::test]
async fn registry_reflects_indexing_lifecycle() {
    let base = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    std::fs::write(ws.path().join("one.txt"), "single document").unwrap();

    let engine = engine_in(&base).await;
    let (hash, _) = engine.index_workspace(ws.path(), true).await.unwrap();

    let entry = engine.registry().get_by_hash(&hash).await.unwrap();
    assert_eq!(entry.status, WorkspaceStatus::Active);
    assert_eq!(entry.document_count, 1);
    assert!(entry.last_indexed_ms > 0);

    let listed = engine.list_workspaces().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].hash, hash);

    engine.unregister_workspace(&hash).await.unwrap();
    assert!(engine.registry().get_by_hash(&hash).await.is_none());

    engine.shutdown().await;
}

#[tokio::test]
async fn reindex_skips_when_fresh_and_not_forced() {
    let base = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    std::fs::write(ws.path().join("a.txt"), "content").unwrap();

    let engine = engine_in(&base).await;
    let (_, first) = engine.index_workspace(ws.path(), true).await.unwrap();
    assert!(!first.skipped_fresh);

    // Unforced, freshly written index: the pipeline short-circuits.
    let (_, second) = engine.index_workspace(ws.path(), false).await.unwrap();
    assert!(second.skipped_fresh);

    engine.shutdown().await;
}

#[tokio::test]
async fn glob_and_grep_route_through_symbol_db() {
    let base = TempDir::new().unwrap();
    let ws = TempDir::new().unwrap();
    std::fs::create_dir_all(ws.path().join("src")).unwrap();
    std::fs::write(ws.path().join("src/lib.rs"), "pub fn alpha() {}").unwrap();
    std::fs::write(ws.path().join("notes.md"), "remember the beta flag").unwrap();

    let engine = engine_in(&base).await;
    engine.index_workspace(ws.path(), true).await.unwrap();

    let rs_files = engine.search_files(ws.path(), "src/**/*.rs").await.unwrap();
    assert_eq!(rs_files, vec!["src/lib.rs"]);

    let grep = engine.grep(ws.path(), "beta", 10).await.unwrap();
    assert_eq!(grep.len(), 1);
    assert_eq!(grep[0].0, "notes.md");

    engine.shutdown().await;
}
