//! Call-path tracing over the identifier graph.
//!
//! Tier 1 is the exact recursive traversal in the symbol database. Tier 3
//! adds "semantic bridges": symbols the vector index considers close to the
//! traced name, used to jump across language boundaries where no direct
//! identifier edge exists. Bridges are appended after exact rows and never
//! interleave with them.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::EngineResult;
use crate::storage::{CallPathRow, SymbolDb};
use crate::types::{Identifier, Symbol, TraceDirection};

/// Candidates fetched from the vector index per bridge query.
const BRIDGE_CANDIDATES: usize = 20;
/// Minimum similarity for a semantic bridge.
const BRIDGE_THRESHOLD: f32 = 0.7;
/// Containing-symbol names mixed into the bridge query text.
const BRIDGE_CONTEXT_NAMES: usize = 3;

/// One node of a traced call path. Flat: hierarchy is implicit in `depth`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallPathNode {
    /// The usage occurrence. None for semantic bridges, which have no
    /// identifier edge.
    pub identifier: Option<Identifier>,
    pub containing_symbol: Option<Symbol>,
    pub target_symbol: Option<Symbol>,
    pub depth: u32,
    pub direction: TraceDirection,
    pub is_semantic_match: bool,
    pub confidence: f32,
}

/// Upward/downward traversal plus semantic bridge discovery.
pub struct CallPathTracer {
    db: Arc<Mutex<SymbolDb>>,
    embedding: Arc<EmbeddingProvider>,
}

impl CallPathTracer {
    pub fn new(db: Arc<Mutex<SymbolDb>>, embedding: Arc<EmbeddingProvider>) -> Self {
        Self { db, embedding }
    }

    /// Who calls `name`, deepest ancestry last.
    pub async fn trace_upward(
        &self,
        name: &str,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathNode>> {
        let rows = {
            let db = self.db.lock().await;
            db.trace_upward(name, max_depth, case_sensitive)?
        };
        let mut nodes = to_nodes(rows, TraceDirection::Upward);
        self.append_bridges(name, TraceDirection::Upward, &mut nodes)
            .await;
        Ok(nodes)
    }

    /// What `name` calls, transitively.
    pub async fn trace_downward(
        &self,
        name: &str,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathNode>> {
        let rows = {
            let db = self.db.lock().await;
            db.trace_downward(name, max_depth, case_sensitive)?
        };
        let mut nodes = to_nodes(rows, TraceDirection::Downward);
        self.append_bridges(name, TraceDirection::Downward, &mut nodes)
            .await;
        Ok(nodes)
    }

    /// Both directions, run concurrently. Upward rows come first.
    pub async fn trace_both(
        &self,
        name: &str,
        max_depth: u32,
        case_sensitive: bool,
    ) -> EngineResult<Vec<CallPathNode>> {
        let (up, down) = tokio::join!(
            self.trace_upward(name, max_depth, case_sensitive),
            self.trace_downward(name, max_depth, case_sensitive),
        );
        let mut nodes = up?;
        nodes.extend(down?);
        Ok(nodes)
    }

    /// Tier-3 semantic bridges: embed the traced name with a little exact
    /// context, pull near neighbors, and append anything the exact tier did
    /// not already reach. Unavailable vectors mean no bridges, never an
    /// error.
    async fn append_bridges(
        &self,
        name: &str,
        direction: TraceDirection,
        nodes: &mut Vec<CallPathNode>,
    ) {
        if !self.embedding.is_available() {
            return;
        }

        let mut query = name.to_string();
        let mut seen_context = HashSet::new();
        for node in nodes.iter() {
            if seen_context.len() >= BRIDGE_CONTEXT_NAMES {
                break;
            }
            if let Some(symbol) = &node.containing_symbol {
                if seen_context.insert(symbol.name.clone()) {
                    query.push(' ');
                    query.push_str(&symbol.name);
                }
            }
        }

        let Ok(vector) = self.embedding.embed_one(&query).await else {
            debug!("semantic bridge embedding failed; returning exact tier only");
            return;
        };
        let neighbors = {
            let db = self.db.lock().await;
            match db.nearest_symbols(&vector, BRIDGE_CANDIDATES) {
                Ok(neighbors) => neighbors,
                Err(_) => return,
            }
        };

        let known: HashSet<String> = nodes
            .iter()
            .flat_map(|node| {
                node.containing_symbol
                    .iter()
                    .chain(node.target_symbol.iter())
                    .map(|s| s.id.clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        for (symbol, similarity) in neighbors {
            if similarity < BRIDGE_THRESHOLD {
                continue;
            }
            if symbol.name == name || known.contains(&symbol.id) {
                continue;
            }
            nodes.push(CallPathNode {
                identifier: None,
                containing_symbol: None,
                target_symbol: Some(symbol),
                depth: 0,
                direction,
                is_semantic_match: true,
                confidence: similarity,
            });
        }
    }
}

fn to_nodes(rows: Vec<CallPathRow>, direction: TraceDirection) -> Vec<CallPathNode> {
    rows.into_iter()
        .map(|row| CallPathNode {
            confidence: row.identifier.confidence,
            identifier: Some(row.identifier),
            containing_symbol: row.containing_symbol,
            target_symbol: row.target_symbol,
            depth: row.depth,
            direction,
            is_semantic_match: false,
        })
        .collect()
}
