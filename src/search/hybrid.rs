//! Hybrid search: lexical and semantic tiers run in parallel, results merge
//! through a configurable rank-fusion strategy.
//!
//! Each tier is asked for twice the requested result count to widen the
//! fusion pool. When the semantic tier is unavailable or fails, lexical
//! results are returned alone and the merge strategy is tagged
//! `LexicalOnly-Fallback`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::FusionConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::EngineResult;
use crate::index::manager::WorkspaceIndex;
use crate::storage::SymbolDb;

/// RRF rank constant.
const RRF_K: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStrategy {
    Linear,
    ReciprocalRankFusion,
    Multiplicative,
}

impl FusionStrategy {
    pub fn from_config(name: &str) -> Self {
        match name {
            "rrf" => Self::ReciprocalRankFusion,
            "multiplicative" => Self::Multiplicative,
            _ => Self::Linear,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::ReciprocalRankFusion => "rrf",
            Self::Multiplicative => "multiplicative",
        }
    }
}

/// One fused result. `id` is the document path for file-level fusion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HybridHit {
    pub id: String,
    pub score: f32,
    pub lexical_score: Option<f32>,
    pub semantic_score: Option<f32>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HybridResults {
    pub merge_strategy: String,
    pub hits: Vec<HybridHit>,
}

/// Runs both tiers and fuses.
pub struct HybridSearch {
    fusion: FusionConfig,
    embedding: Arc<EmbeddingProvider>,
}

impl HybridSearch {
    pub fn new(fusion: FusionConfig, embedding: Arc<EmbeddingProvider>) -> Self {
        Self { fusion, embedding }
    }

    /// Search one workspace. Lexical hits come from the inverted index;
    /// semantic hits from symbol embeddings, rolled up to their file.
    pub async fn search(
        &self,
        entry: &WorkspaceIndex,
        db: &Arc<Mutex<SymbolDb>>,
        query: &str,
        max_results: usize,
    ) -> EngineResult<HybridResults> {
        let pool = max_results.max(1) * 2;

        let lexical_task = async {
            entry
                .search(query, pool)
                .map(|hits| {
                    hits.into_iter()
                        .map(|h| (h.path, h.score))
                        .collect::<Vec<_>>()
                })
        };
        let semantic_task = async {
            let vector = self.embedding.embed_one(query).await?;
            let db = db.lock().await;
            let neighbors = db.nearest_symbols(&vector, pool)?;
            // Roll symbol hits up to their file, best similarity wins.
            let mut by_file: HashMap<String, f32> = HashMap::new();
            for (symbol, similarity) in neighbors {
                let slot = by_file.entry(symbol.file_path).or_insert(similarity);
                if similarity > *slot {
                    *slot = similarity;
                }
            }
            let mut rolled: Vec<(String, f32)> = by_file.into_iter().collect();
            rolled.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            Ok::<_, crate::error::EngineError>(rolled)
        };

        let (lexical, semantic) = tokio::join!(lexical_task, semantic_task);
        let lexical = lexical?;

        match semantic {
            Ok(semantic) => {
                let strategy = FusionStrategy::from_config(&self.fusion.strategy);
                let mut hits = fuse(&lexical, &semantic, strategy, &self.fusion);
                hits.truncate(max_results);
                Ok(HybridResults {
                    merge_strategy: strategy.label().to_string(),
                    hits,
                })
            }
            Err(e) => {
                debug!("semantic tier failed ({e}); lexical-only fallback");
                // Per-hit lexical scores are preserved, not flattened.
                let mut hits: Vec<HybridHit> = lexical
                    .into_iter()
                    .map(|(id, score)| HybridHit {
                        id,
                        score,
                        lexical_score: Some(score),
                        semantic_score: None,
                    })
                    .collect();
                hits.truncate(max_results);
                Ok(HybridResults {
                    merge_strategy: "LexicalOnly-Fallback".to_string(),
                    hits,
                })
            }
        }
    }
}

/// Merge two ranked lists. Pure so strategies can be tested directly.
pub fn fuse(
    lexical: &[(String, f32)],
    semantic: &[(String, f32)],
    strategy: FusionStrategy,
    config: &FusionConfig,
) -> Vec<HybridHit> {
    let lex_ranks: HashMap<&str, (usize, f32)> = lexical
        .iter()
        .enumerate()
        .map(|(rank, (id, score))| (id.as_str(), (rank + 1, *score)))
        .collect();
    let sem_ranks: HashMap<&str, (usize, f32)> = semantic
        .iter()
        .enumerate()
        .map(|(rank, (id, score))| (id.as_str(), (rank + 1, *score)))
        .collect();

    let mut ids: Vec<&str> = lexical.iter().map(|(id, _)| id.as_str()).collect();
    for (id, _) in semantic {
        if !lex_ranks.contains_key(id.as_str()) {
            ids.push(id.as_str());
        }
    }

    let w_lex = config.lexical_weight;
    let w_sem = config.semantic_weight;
    let boost = config.both_found_boost;

    let mut hits: Vec<HybridHit> = ids
        .into_iter()
        .map(|id| {
            let lex = lex_ranks.get(id);
            let sem = sem_ranks.get(id);
            let score = match strategy {
                FusionStrategy::Linear => {
                    let base = w_lex * lex.map(|(_, s)| *s).unwrap_or(0.0)
                        + w_sem * sem.map(|(_, s)| *s).unwrap_or(0.0);
                    if lex.is_some() && sem.is_some() {
                        base * boost
                    } else {
                        base
                    }
                }
                FusionStrategy::ReciprocalRankFusion => {
                    let lex_term = lex
                        .map(|(rank, _)| w_lex / (*rank as f32 + RRF_K))
                        .unwrap_or(0.0);
                    let sem_term = sem
                        .map(|(rank, _)| w_sem / (*rank as f32 + RRF_K))
                        .unwrap_or(0.0);
                    lex_term + sem_term
                }
                FusionStrategy::Multiplicative => match (lex, sem) {
                    (Some((_, l)), Some((_, s))) => l * s * boost * 2.0,
                    _ => {
                        let lex_score = lex.map(|(_, s)| w_lex * *s).unwrap_or(0.0);
                        let sem_score = sem.map(|(_, s)| w_sem * *s).unwrap_or(0.0);
                        lex_score.max(sem_score)
                    }
                },
            };
            HybridHit {
                id: id.to_string(),
                score,
                lexical_score: lex.map(|(_, s)| *s),
                semantic_score: sem.map(|(_, s)| *s),
            }
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}
