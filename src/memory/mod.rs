//! Schema-free memory store: project notes, architectural decisions,
//! technical debt.
//!
//! Two independent lexical indexes back the store: *project memory* (shared,
//! version-controllable) and *local memory* (personal, per-machine). Entries
//! and relationships live in the same index, separated by a `doc_type`
//! discriminator. Extended fields are serialized into a stored JSON field
//! and additionally indexed through a dynamic JSON field so
//! `fields.priority:high` style queries work. Search is hybrid: lexical
//! always, semantic when an embedding provider is configured.

pub mod entry;
pub mod validate;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    FAST, Field, IndexRecordOption, OwnedValue, STORED, STRING, Schema, SchemaBuilder, TEXT, Value,
};
use tantivy::{
    Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument as Document,
    Term,
};
use tracing::debug;

pub use entry::{CheckpointIdGenerator, MemoryEntry, MemoryRelationKind, MemoryRelationship};
pub use validate::{ValidationReport, validate_memory};

use crate::config::FusionConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, EngineResult};
use crate::search::hybrid::{FusionStrategy, fuse};
use crate::storage::vector::{cosine_similarity, decode_vector, encode_vector};
use crate::workspace::registry::now_ms;
use crate::workspace::resolver::PathResolver;

const MEMORY_WRITER_HEAP: usize = 50_000_000;
/// Candidate pool scanned for the semantic tier.
const SEMANTIC_SCAN_LIMIT: usize = 1_000;

#[derive(Debug, Clone)]
struct MemorySchema {
    doc_type: Field,
    id: Field,
    entry_type: Field,
    content: Field,
    created: Field,
    modified: Field,
    last_accessed: Field,
    access_count: Field,
    session_id: Field,
    is_shared: Field,
    files_involved: Field,
    fields_json: Field,
    fields: Field,
    embedding: Field,
    rel_from: Field,
    rel_to: Field,
    rel_kind: Field,
    rel_bidirectional: Field,
}

fn build_schema() -> (Schema, MemorySchema) {
    let mut builder = SchemaBuilder::default();
    let doc_type = builder.add_text_field("doc_type", STRING | STORED | FAST);
    let id = builder.add_text_field("id", STRING | STORED);
    let entry_type = builder.add_text_field("type", STRING | STORED);
    let content = builder.add_text_field("content", TEXT | STORED);
    let created = builder.add_u64_field("created", STORED | FAST);
    let modified = builder.add_u64_field("modified", STORED | FAST);
    let last_accessed = builder.add_u64_field("last_accessed", STORED);
    let access_count = builder.add_u64_field("access_count", STORED);
    let session_id = builder.add_text_field("session_id", STRING | STORED);
    let is_shared = builder.add_u64_field("is_shared", STORED);
    let files_involved = builder.add_text_field("files_involved", TEXT | STORED);
    let fields_json = builder.add_text_field("fields_json", STORED);
    let fields = builder.add_json_field("fields", TEXT);
    let embedding = builder.add_bytes_field("embedding", STORED);
    let rel_from = builder.add_text_field("rel_from", STRING | STORED);
    let rel_to = builder.add_text_field("rel_to", STRING | STORED);
    let rel_kind = builder.add_text_field("rel_kind", STRING | STORED);
    let rel_bidirectional = builder.add_u64_field("rel_bidirectional", STORED);

    let schema = builder.build();
    let memory_schema = MemorySchema {
        doc_type,
        id,
        entry_type,
        content,
        created,
        modified,
        last_accessed,
        access_count,
        session_id,
        is_shared,
        files_involved,
        fields_json,
        fields,
        embedding,
        rel_from,
        rel_to,
        rel_kind,
        rel_bidirectional,
    };
    (schema, memory_schema)
}

/// One search hit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub score: f32,
}

/// A single memory index (project or local).
pub struct MemoryStore {
    reader: IndexReader,
    writer: Mutex<IndexWriter<Document>>,
    index: Index,
    schema: MemorySchema,
    ids: CheckpointIdGenerator,
    embedding: Arc<EmbeddingProvider>,
    fusion: FusionConfig,
}

impl MemoryStore {
    pub fn open(
        path: &Path,
        embedding: Arc<EmbeddingProvider>,
        fusion: FusionConfig,
    ) -> EngineResult<Self> {
        std::fs::create_dir_all(path)?;
        let (schema, memory_schema) = build_schema();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            let dir = MmapDirectory::open(path)?;
            Index::create(dir, schema, IndexSettings::default())?
        };
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;
        let writer = index.writer::<Document>(MEMORY_WRITER_HEAP)?;

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            index,
            schema: memory_schema,
            ids: CheckpointIdGenerator::new(),
            embedding,
            fusion,
        })
    }

    /// Validate and store an entry. An empty id is filled with a fresh
    /// checkpoint id. Returns (id, validation report with any warnings).
    pub async fn store(&self, mut entry: MemoryEntry) -> EngineResult<(String, ValidationReport)> {
        let report = validate_memory(&entry);
        if !report.is_valid() {
            return Err(EngineError::InvalidArgument {
                reason: report.errors.join("; "),
            });
        }
        if entry.id.is_empty() {
            entry.id = self.ids.next();
        }

        let vector = if self.embedding.is_available() {
            self.embedding.embed_one(&entry.content).await.ok()
        } else {
            None
        };

        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema.id, &entry.id));
            writer.add_document(self.entry_to_doc(&entry, vector.as_deref()))?;
            writer.commit()?;
        }
        self.reader.reload()?;
        debug!("stored memory {} ({})", entry.id, entry.entry_type);
        Ok((entry.id, report))
    }

    /// Fetch an entry and bump its access statistics.
    pub fn get(&self, id: &str) -> EngineResult<Option<MemoryEntry>> {
        let Some((mut entry, vector)) = self.get_raw(id)? else {
            return Ok(None);
        };
        entry.access_count += 1;
        entry.last_accessed = now_ms();
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema.id, id));
            writer.add_document(self.entry_to_doc(&entry, vector.as_deref()))?;
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(Some(entry))
    }

    /// Update content and/or extended fields; `modified` is re-stamped.
    /// Entries are never auto-deleted.
    pub async fn update(
        &self,
        id: &str,
        content: Option<String>,
        fields: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> EngineResult<MemoryEntry> {
        let Some((mut entry, _)) = self.get_raw(id)? else {
            return Err(EngineError::NotFound {
                entity: format!("memory entry {id}"),
            });
        };
        if let Some(content) = content {
            entry.content = content;
        }
        if let Some(fields) = fields {
            entry.fields = fields;
        }
        entry.modified = now_ms();

        let report = validate_memory(&entry);
        if !report.is_valid() {
            return Err(EngineError::InvalidArgument {
                reason: report.errors.join("; "),
            });
        }
        let vector = if self.embedding.is_available() {
            self.embedding.embed_one(&entry.content).await.ok()
        } else {
            None
        };
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema.id, id));
            writer.add_document(self.entry_to_doc(&entry, vector.as_deref()))?;
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(entry)
    }

    /// Hybrid search: lexical always; semantic tier joins when the provider
    /// is configured. Provider failure degrades to lexical-only.
    pub async fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<MemoryHit>> {
        let lexical = self.search_lexical(query, limit.max(1) * 2)?;

        let semantic: Vec<(String, f32)> = if self.embedding.is_available() {
            match self.embedding.embed_one(query).await {
                Ok(vector) => self.scan_semantic(&vector)?,
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let hits = if semantic.is_empty() {
            lexical
                .iter()
                .map(|(id, score)| (id.clone(), *score))
                .map(|(id, score)| crate::search::hybrid::HybridHit {
                    id,
                    score,
                    lexical_score: Some(score),
                    semantic_score: None,
                })
                .collect()
        } else {
            fuse(
                &lexical,
                &semantic,
                FusionStrategy::from_config(&self.fusion.strategy),
                &self.fusion,
            )
        };

        let mut results = Vec::new();
        for hit in hits.into_iter().take(limit) {
            if let Some((entry, _)) = self.get_raw(&hit.id)? {
                results.push(MemoryHit {
                    entry,
                    score: hit.score,
                });
            }
        }
        Ok(results)
    }

    /// Store a relationship. Both endpoints must exist. Symmetric kinds (and
    /// explicit `bidirectional`) are indexed in both directions.
    pub fn relate(&self, relationship: &MemoryRelationship) -> EngineResult<()> {
        for endpoint in [&relationship.from_id, &relationship.to_id] {
            if self.get_raw(endpoint)?.is_none() {
                return Err(EngineError::NotFound {
                    entity: format!("memory entry {endpoint}"),
                });
            }
        }
        let mirrored = relationship.bidirectional || relationship.kind.is_symmetric();
        {
            let mut writer = self.writer.lock();
            writer.add_document(self.relationship_to_doc(
                &relationship.from_id,
                &relationship.to_id,
                relationship.kind,
                mirrored,
            ))?;
            if mirrored {
                writer.add_document(self.relationship_to_doc(
                    &relationship.to_id,
                    &relationship.from_id,
                    relationship.kind,
                    mirrored,
                ))?;
            }
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    /// All relationships where `id` is the origin.
    pub fn relationships_from(&self, id: &str) -> EngineResult<Vec<MemoryRelationship>> {
        let searcher = self.reader.searcher();
        let query = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.doc_type, "relationship"),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.rel_from, id),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
        ]);
        let top = searcher.search(&query, &TopDocs::with_limit(1_000))?;
        let mut out = Vec::new();
        for (_score, address) in top {
            let doc: Document = searcher.doc(address)?;
            let kind_str = doc
                .get_first(self.schema.rel_kind)
                .and_then(|v| v.as_str())
                .unwrap_or("relatedTo");
            out.push(MemoryRelationship {
                from_id: doc
                    .get_first(self.schema.rel_from)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                to_id: doc
                    .get_first(self.schema.rel_to)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                kind: MemoryRelationKind::parse(kind_str)
                    .unwrap_or(MemoryRelationKind::RelatedTo),
                bidirectional: doc
                    .get_first(self.schema.rel_bidirectional)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    == 1,
            });
        }
        Ok(out)
    }

    pub fn count(&self) -> EngineResult<u64> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.doc_type, "memory"),
            IndexRecordOption::Basic,
        );
        let count = searcher.search(&query, &tantivy::collector::Count)?;
        Ok(count as u64)
    }

    fn search_lexical(&self, query: &str, limit: usize) -> EngineResult<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(
            &self.index,
            vec![
                self.schema.content,
                self.schema.files_involved,
                self.schema.fields,
            ],
        );
        let parsed = parser
            .parse_query(query)
            .map_err(|_| EngineError::InvalidArgument {
                reason: "memory query could not be parsed".into(),
            })?;
        let full = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.doc_type, "memory"),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
            (Occur::Must, parsed),
        ]);
        let top = searcher.search(&full, &TopDocs::with_limit(limit))?;
        let mut out = Vec::new();
        for (score, address) in top {
            let doc: Document = searcher.doc(address)?;
            if let Some(id) = doc.get_first(self.schema.id).and_then(|v| v.as_str()) {
                out.push((id.to_string(), score));
            }
        }
        Ok(out)
    }

    /// Cosine scan over stored entry embeddings.
    fn scan_semantic(&self, query_vector: &[f32]) -> EngineResult<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.schema.doc_type, "memory"),
            IndexRecordOption::Basic,
        );
        let top = searcher.search(&query, &TopDocs::with_limit(SEMANTIC_SCAN_LIMIT))?;
        let mut scored = Vec::new();
        for (_score, address) in top {
            let doc: Document = searcher.doc(address)?;
            let Some(id) = doc.get_first(self.schema.id).and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(bytes) = doc.get_first(self.schema.embedding).and_then(|v| v.as_bytes())
            else {
                continue;
            };
            let vector = decode_vector(bytes);
            if vector.len() != query_vector.len() {
                continue;
            }
            let similarity = cosine_similarity(query_vector, &vector).clamp(0.0, 1.0);
            scored.push((id.to_string(), similarity));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    fn get_raw(&self, id: &str) -> EngineResult<Option<(MemoryEntry, Option<Vec<f32>>)>> {
        let searcher = self.reader.searcher();
        let query = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.doc_type, "memory"),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.schema.id, id),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
        ]);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_score, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: Document = searcher.doc(address)?;
        Ok(Some(self.doc_to_entry(&doc)))
    }

    fn entry_to_doc(&self, entry: &MemoryEntry, vector: Option<&[f32]>) -> Document {
        let mut doc = Document::new();
        doc.add_text(self.schema.doc_type, "memory");
        doc.add_text(self.schema.id, &entry.id);
        doc.add_text(self.schema.entry_type, &entry.entry_type);
        doc.add_text(self.schema.content, &entry.content);
        doc.add_u64(self.schema.created, entry.created);
        doc.add_u64(self.schema.modified, entry.modified);
        doc.add_u64(self.schema.last_accessed, entry.last_accessed);
        doc.add_u64(self.schema.access_count, entry.access_count);
        if let Some(session) = &entry.session_id {
            doc.add_text(self.schema.session_id, session);
        }
        doc.add_u64(self.schema.is_shared, entry.is_shared as u64);
        for file in &entry.files_involved {
            doc.add_text(self.schema.files_involved, file);
        }
        if !entry.fields.is_empty() {
            let serialized = serde_json::Value::Object(entry.fields.clone()).to_string();
            doc.add_text(self.schema.fields_json, &serialized);
            let object: BTreeMap<String, OwnedValue> = entry
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), OwnedValue::from(v.clone())))
                .collect();
            doc.add_object(self.schema.fields, object);
        }
        if let Some(vector) = vector {
            doc.add_bytes(self.schema.embedding, &encode_vector(vector));
        }
        doc
    }

    fn relationship_to_doc(
        &self,
        from: &str,
        to: &str,
        kind: MemoryRelationKind,
        bidirectional: bool,
    ) -> Document {
        let mut doc = Document::new();
        doc.add_text(self.schema.doc_type, "relationship");
        doc.add_text(self.schema.rel_from, from);
        doc.add_text(self.schema.rel_to, to);
        doc.add_text(self.schema.rel_kind, kind.as_str());
        doc.add_u64(self.schema.rel_bidirectional, bidirectional as u64);
        doc
    }

    fn doc_to_entry(&self, doc: &Document) -> (MemoryEntry, Option<Vec<f32>>) {
        let text =
            |field: Field| -> String {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
        let number = |field: Field| -> u64 {
            doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
        };

        let fields = doc
            .get_first(self.schema.fields_json)
            .and_then(|v| v.as_str())
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default();
        let files_involved = doc
            .get_all(self.schema.files_involved)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect();
        let session_id = doc
            .get_first(self.schema.session_id)
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let vector = doc
            .get_first(self.schema.embedding)
            .and_then(|v| v.as_bytes())
            .map(decode_vector);

        (
            MemoryEntry {
                id: text(self.schema.id),
                entry_type: text(self.schema.entry_type),
                content: text(self.schema.content),
                created: number(self.schema.created),
                modified: number(self.schema.modified),
                last_accessed: number(self.schema.last_accessed),
                access_count: number(self.schema.access_count),
                session_id,
                is_shared: number(self.schema.is_shared) == 1,
                files_involved,
                fields,
            },
            vector,
        )
    }
}

/// The pair of memory stores the engine serves.
pub struct MemoryStores {
    pub project: MemoryStore,
    pub local: MemoryStore,
}

impl MemoryStores {
    pub fn open(
        resolver: &PathResolver,
        embedding: Arc<EmbeddingProvider>,
        fusion: FusionConfig,
    ) -> EngineResult<Self> {
        let (project_path, local_path) = resolver.memory_paths();
        Ok(Self {
            project: MemoryStore::open(&project_path, Arc::clone(&embedding), fusion.clone())?,
            local: MemoryStore::open(&local_path, embedding, fusion)?,
        })
    }

    pub fn store_for(&self, shared: bool) -> &MemoryStore {
        if shared { &self.project } else { &self.local }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use tempfile::TempDir;

    fn store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let embedding = Arc::new(EmbeddingProvider::new(&EmbeddingConfig::default()));
        let store = MemoryStore::open(dir.path(), embedding, FusionConfig::default()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_assigns_checkpoint_id_and_round_trips() {
        let (_dir, store) = store();
        let mut entry = MemoryEntry::new("ArchitecturalDecision", "we will batch all commits");
        entry
            .fields
            .insert("priority".into(), serde_json::json!("high"));
        entry.files_involved = vec!["src/index/batch.rs".into()];

        let (id, report) = store.store(entry).await.unwrap();
        assert!(id.starts_with("CHECKPOINT-"));
        assert!(report.is_valid());

        let fetched = store.get(&id).unwrap().unwrap();
        assert_eq!(fetched.entry_type, "ArchitecturalDecision");
        assert_eq!(fetched.fields["priority"], serde_json::json!("high"));
        assert_eq!(fetched.files_involved, vec!["src/index/batch.rs"]);
    }

    #[tokio::test]
    async fn get_bumps_access_statistics() {
        let (_dir, store) = store();
        let (id, _) = store
            .store(MemoryEntry::new("Note", "read me twice"))
            .await
            .unwrap();

        let first = store.get(&id).unwrap().unwrap();
        assert_eq!(first.access_count, 1);
        let second = store.get(&id).unwrap().unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[tokio::test]
    async fn invalid_entry_is_rejected() {
        let (_dir, store) = store();
        let mut bad = MemoryEntry::new("Note", "content");
        bad.files_involved = vec!["../outside".into()];
        let err = store.store(bad).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn lexical_search_finds_entries() {
        let (_dir, store) = store();
        store
            .store(MemoryEntry::new("TechnicalDebt", "the tokenizer allocates too much"))
            .await
            .unwrap();
        store
            .store(MemoryEntry::new("Note", "renew the TLS certificates"))
            .await
            .unwrap();

        let hits = store.search("tokenizer", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].entry.content.contains("tokenizer"));
    }

    #[tokio::test]
    async fn update_rewrites_content_and_modified() {
        let (_dir, store) = store();
        let (id, _) = store
            .store(MemoryEntry::new("Note", "first draft"))
            .await
            .unwrap();

        let updated = store
            .update(&id, Some("second draft".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.content, "second draft");

        let hits = store.search("draft", 10).await.unwrap();
        assert_eq!(hits.len(), 1, "update must replace, not duplicate");
    }

    #[tokio::test]
    async fn relationships_require_endpoints_and_mirror_symmetric_kinds() {
        let (_dir, store) = store();
        let (a, _) = store.store(MemoryEntry::new("Note", "entry a")).await.unwrap();
        let (b, _) = store.store(MemoryEntry::new("Note", "entry b")).await.unwrap();

        let missing = MemoryRelationship {
            from_id: a.clone(),
            to_id: "CHECKPOINT-0000000000000-000000".into(),
            kind: MemoryRelationKind::BlockedBy,
            bidirectional: false,
        };
        assert!(store.relate(&missing).is_err());

        store
            .relate(&MemoryRelationship {
                from_id: a.clone(),
                to_id: b.clone(),
                kind: MemoryRelationKind::RelatedTo,
                bidirectional: false,
            })
            .unwrap();

        // Symmetric kind: both directions are indexed.
        assert_eq!(store.relationships_from(&a).unwrap().len(), 1);
        assert_eq!(store.relationships_from(&b).unwrap().len(), 1);

        store
            .relate(&MemoryRelationship {
                from_id: a.clone(),
                to_id: b.clone(),
                kind: MemoryRelationKind::BlockedBy,
                bidirectional: false,
            })
            .unwrap();
        // Asymmetric: only the origin side gains an edge.
        assert_eq!(store.relationships_from(&a).unwrap().len(), 2);
        assert_eq!(store.relationships_from(&b).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extended_fields_are_searchable() {
        let (_dir, store) = store();
        let mut entry = MemoryEntry::new("TechnicalDebt", "slow path in resolver");
        entry
            .fields
            .insert("component".into(), serde_json::json!("resolver"));
        store.store(entry).await.unwrap();

        let hits = store.search("fields.component:resolver", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn project_and_local_stores_are_independent() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path());
        let embedding = Arc::new(EmbeddingProvider::new(&EmbeddingConfig::default()));
        let stores = MemoryStores::open(&resolver, embedding, FusionConfig::default()).unwrap();

        let mut shared = MemoryEntry::new("Note", "shared knowledge");
        shared.is_shared = true;
        stores.store_for(true).store(shared).await.unwrap();

        assert_eq!(stores.project.count().unwrap(), 1);
        assert_eq!(stores.local.count().unwrap(), 0);
    }
}
