//! MCP (Model Context Protocol) tool surface.
//!
//! Exposes the engine's query and indexing operations as MCP tools over the
//! stdio transport. Every response carries a top-level `success` flag; on
//! failure the body is `{kind, message, suggestions}` so agents can react by
//! policy. Logs never touch stdout — it belongs to JSON-RPC.

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars,
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::memory::{MemoryEntry, MemoryRelationKind, MemoryRelationship};
use crate::types::TraceDirection;

fn default_limit() -> usize {
    10
}

fn default_depth() -> u32 {
    5
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct IndexWorkspaceRequest {
    /// Absolute path of the workspace root to index
    pub path: PathBuf,
    /// Re-index even when the on-disk index looks fresh
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct TextSearchRequest {
    /// Workspace root (must be indexed first)
    pub workspace: PathBuf,
    /// Query string; append `~` to a single term for fuzzy matching
    pub query: String,
    /// Maximum number of results (default: 10)
    #[serde(default = "default_limit")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindSymbolRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Symbol name to find
    pub name: String,
    /// Match case exactly (default: false)
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindReferencesRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Identifier name whose usages to list
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchFilesRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Glob pattern; `!`-prefixed globs exclude, comma separates several
    pub pattern: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct TraceCallPathRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Function or method name to trace
    pub symbol: String,
    /// "upward" (callers), "downward" (callees), or "both" (default)
    #[serde(default)]
    pub direction: Option<String>,
    /// Maximum traversal depth (default: 5)
    #[serde(default = "default_depth")]
    pub max_depth: u32,
    /// Match case exactly (default: false)
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct HybridSearchRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Natural-language or keyword query
    pub query: String,
    /// Maximum number of results (default: 10)
    #[serde(default = "default_limit")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SemanticSearchRequest {
    /// Workspace root
    pub workspace: PathBuf,
    /// Natural-language query
    pub query: String,
    /// Maximum number of results (default: 10)
    #[serde(default = "default_limit")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct StoreMemoryRequest {
    /// Free-form type tag, e.g. "TechnicalDebt", "ArchitecturalDecision"
    #[serde(rename = "type")]
    pub entry_type: String,
    /// The note body (max 100 KB)
    pub content: String,
    /// Store in shared project memory instead of local memory
    #[serde(default)]
    pub is_shared: bool,
    /// Related file paths (max 50)
    #[serde(default)]
    pub files: Vec<String>,
    /// Extended fields (max 20; reserved names rejected)
    #[serde(default)]
    pub fields: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchMemoryRequest {
    /// Query over content, files, and extended fields
    pub query: String,
    /// Search shared project memory instead of local memory
    #[serde(default)]
    pub is_shared: bool,
    /// Maximum number of results (default: 10)
    #[serde(default = "default_limit")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct LinkMemoriesRequest {
    /// Origin entry id
    pub from_id: String,
    /// Target entry id
    pub to_id: String,
    /// Relationship kind, e.g. "relatedTo", "blockedBy", "supersedes"
    pub kind: String,
    /// Index the edge in both directions
    #[serde(default)]
    pub bidirectional: bool,
    /// Link in shared project memory instead of local memory
    #[serde(default)]
    pub is_shared: bool,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetIndexInfoRequest {
    /// Workspace root
    pub workspace: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ListWorkspacesRequest {}

/// MCP server wrapping the engine.
#[derive(Clone)]
pub struct CodeSearchServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

/// Success envelope.
fn ok(payload: serde_json::Value) -> CallToolResult {
    let body = json!({ "success": true, "result": payload });
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()),
    )])
}

/// Failure envelope with the taxonomy kind and recovery suggestions.
fn fail(error: EngineError) -> CallToolResult {
    let body = json!({
        "success": false,
        "error": {
            "kind": error.kind(),
            "message": error.to_string(),
            "suggestions": error.recovery_suggestions(),
        }
    });
    CallToolResult::error(vec![Content::text(
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()),
    )])
}

fn envelope(result: Result<serde_json::Value, EngineError>) -> CallToolResult {
    match result {
        Ok(payload) => ok(payload),
        Err(error) => fail(error),
    }
}

#[tool_router]
impl CodeSearchServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Index a workspace directory (build or refresh its search indexes)")]
    pub async fn index_workspace(
        &self,
        Parameters(IndexWorkspaceRequest { path, force }): Parameters<IndexWorkspaceRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .index_workspace(&path, force)
            .await
            .and_then(|(hash, stats)| {
                Ok(json!({ "workspace_hash": hash, "stats": serde_json::to_value(stats)
                    .map_err(|e| EngineError::Fatal(e.to_string()))? }))
            });
        Ok(envelope(result))
    }

    #[tool(description = "Full-text search across an indexed workspace, with per-line matches")]
    pub async fn text_search(
        &self,
        Parameters(TextSearchRequest {
            workspace,
            query,
            max_results,
        }): Parameters<TextSearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .text_search(&workspace, &query, max_results)
            .await
            .and_then(|hits| {
                serde_json::to_value(hits).map_err(|e| EngineError::Fatal(e.to_string()))
            });
        Ok(envelope(result))
    }

    #[tool(description = "Find symbol definitions by name")]
    pub async fn find_symbol(
        &self,
        Parameters(FindSymbolRequest {
            workspace,
            name,
            case_sensitive,
        }): Parameters<FindSymbolRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .find_symbols(&workspace, &name, case_sensitive)
            .await
            .and_then(|symbols| {
                serde_json::to_value(symbols).map_err(|e| EngineError::Fatal(e.to_string()))
            });
        Ok(envelope(result))
    }

    #[tool(description = "List usage occurrences (references) of a name")]
    pub async fn find_references(
        &self,
        Parameters(FindReferencesRequest { workspace, name }): Parameters<FindReferencesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .find_references(&workspace, &name)
            .await
            .and_then(|refs| {
                serde_json::to_value(refs).map_err(|e| EngineError::Fatal(e.to_string()))
            });
        Ok(envelope(result))
    }

    #[tool(description = "Find indexed files by glob pattern (*, **, ?, {a,b}, leading ! negates)")]
    pub async fn search_files(
        &self,
        Parameters(SearchFilesRequest { workspace, pattern }): Parameters<SearchFilesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .search_files(&workspace, &pattern)
            .await
            .map(|paths| json!(paths));
        Ok(envelope(result))
    }

    #[tool(
        description = "Trace call paths for a function: who calls it (upward), what it calls (downward), or both. Semantic bridges are appended when vectors are available"
    )]
    pub async fn trace_call_path(
        &self,
        Parameters(TraceCallPathRequest {
            workspace,
            symbol,
            direction,
            max_depth,
            case_sensitive,
        }): Parameters<TraceCallPathRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let direction = match direction.as_deref() {
            Some("upward") | Some("up") => Some(TraceDirection::Upward),
            Some("downward") | Some("down") => Some(TraceDirection::Downward),
            Some("both") | None => None,
            Some(other) => {
                return Ok(fail(EngineError::InvalidArgument {
                    reason: format!("unknown direction '{other}'"),
                }));
            }
        };
        let result = self
            .engine
            .trace_call_path(&workspace, &symbol, direction, max_depth, case_sensitive)
            .await
            .and_then(|nodes| {
                serde_json::to_value(nodes).map_err(|e| EngineError::Fatal(e.to_string()))
            });
        Ok(envelope(result))
    }

    #[tool(
        description = "Hybrid search merging lexical and semantic results; falls back to lexical-only when no embedding provider is configured"
    )]
    pub async fn hybrid_search(
        &self,
        Parameters(HybridSearchRequest {
            workspace,
            query,
            max_results,
        }): Parameters<HybridSearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .hybrid_search(&workspace, &query, max_results)
            .await
            .and_then(|results| {
                serde_json::to_value(results).map_err(|e| EngineError::Fatal(e.to_string()))
            });
        Ok(envelope(result))
    }

    #[tool(description = "Semantic (vector) symbol search; reports availability instead of failing")]
    pub async fn semantic_search(
        &self,
        Parameters(SemanticSearchRequest {
            workspace,
            query,
            max_results,
        }): Parameters<SemanticSearchRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .engine
            .semantic_symbol_search(&workspace, &query, max_results)
            .await
            .map(|outcome| {
                json!({
                    "available": outcome.available,
                    "results": outcome
                        .results
                        .into_iter()
                        .map(|(symbol, similarity)| json!({
                            "symbol": symbol,
                            "similarity": similarity,
                        }))
                        .collect::<Vec<_>>(),
                })
            });
        Ok(envelope(result))
    }

    #[tool(description = "Store a memory entry (note, decision, technical debt)")]
    pub async fn store_memory(
        &self,
        Parameters(StoreMemoryRequest {
            entry_type,
            content,
            is_shared,
            files,
            fields,
        }): Parameters<StoreMemoryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut entry = MemoryEntry::new(entry_type, content);
        entry.is_shared = is_shared;
        entry.files_involved = files;
        if let Some(fields) = fields {
            entry.fields = fields;
        }
        let store = self.engine.memory().store_for(is_shared);
        let result = store.store(entry).await.map(|(id, report)| {
            json!({ "id": id, "warnings": report.warnings })
        });
        Ok(envelope(result))
    }

    #[tool(description = "Search memory entries (hybrid lexical + semantic)")]
    pub async fn search_memory(
        &self,
        Parameters(SearchMemoryRequest {
            query,
            is_shared,
            max_results,
        }): Parameters<SearchMemoryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let store = self.engine.memory().store_for(is_shared);
        let result = store.search(&query, max_results).await.and_then(|hits| {
            serde_json::to_value(hits).map_err(|e| EngineError::Fatal(e.to_string()))
        });
        Ok(envelope(result))
    }

    #[tool(description = "Link two memory entries with a typed relationship")]
    pub async fn link_memories(
        &self,
        Parameters(LinkMemoriesRequest {
            from_id,
            to_id,
            kind,
            bidirectional,
            is_shared,
        }): Parameters<LinkMemoriesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(kind) = MemoryRelationKind::parse(&kind) else {
            return Ok(fail(EngineError::InvalidArgument {
                reason: format!("unknown relationship kind '{kind}'"),
            }));
        };
        let store = self.engine.memory().store_for(is_shared);
        let relationship = MemoryRelationship {
            from_id,
            to_id,
            kind,
            bidirectional,
        };
        let result = store
            .relate(&relationship)
            .map(|()| json!({ "linked": true }));
        Ok(envelope(result))
    }

    #[tool(description = "Statistics for one indexed workspace")]
    pub async fn get_index_info(
        &self,
        Parameters(GetIndexInfoRequest { workspace }): Parameters<GetIndexInfoRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self.engine.index_info(&workspace).await.map(|(entry, stats)| {
            json!({
                "workspace": {
                    "path": entry.path,
                    "hash": entry.hash,
                    "status": entry.status,
                    "document_count": entry.document_count,
                    "symbol_count": entry.symbol_count,
                    "index_size_bytes": entry.index_size_bytes,
                    "last_indexed_ms": entry.last_indexed_ms,
                },
                "lexical_index": { "num_docs": stats.num_docs, "size_bytes": stats.size_bytes },
            })
        });
        Ok(envelope(result))
    }

    #[tool(description = "List all registered workspaces")]
    pub async fn list_workspaces(
        &self,
        Parameters(_request): Parameters<ListWorkspacesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let workspaces = self.engine.list_workspaces().await;
        Ok(ok(json!(
            workspaces
                .into_iter()
                .map(|w| json!({
                    "path": w.path,
                    "hash": w.hash,
                    "status": w.status,
                    "document_count": w.document_count,
                }))
                .collect::<Vec<_>>()
        )))
    }
}

#[tool_handler]
impl ServerHandler for CodeSearchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_server_info(
                Implementation::new("codescout", env!("CARGO_PKG_VERSION"))
                    .with_title("Codescout Workspace Intelligence")
                    .with_website_url("https://github.com/bartolli/codescout"),
            )
            .with_instructions(
                "Workspace code-intelligence tools. WORKFLOW: call 'index_workspace' once per \
                 workspace root, then query with 'text_search' (exact and fuzzy), 'find_symbol', \
                 'find_references', and 'search_files' (globs). 'trace_call_path' walks the call \
                 graph in either direction. 'hybrid_search' fuses lexical and semantic tiers and \
                 degrades to lexical-only when no embedding provider is configured. The memory \
                 tools persist project notes and decisions across sessions."
                    .to_string(),
            )
    }
}
