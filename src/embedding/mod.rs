//! External embedding provider client.
//!
//! The provider is an HTTP service: `POST {endpoint}/embed` with
//! `{"texts": [...]}` returns `{"embeddings": [[f32, ...], ...]}`. Calls are
//! batched. A missing endpoint degrades to `DependencyUnavailable`, which
//! callers turn into lexical-only behavior, never a hard failure.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, EngineResult};
use crate::monitor::MemoryPressureMonitor;
use crate::storage::SymbolDb;

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for the configured embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingProvider {
    endpoint: Option<String>,
    dimensions: usize,
    batch_size: usize,
    client: reqwest::Client,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of texts, splitting into provider-sized chunks.
    pub async fn embed(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            EngineError::DependencyUnavailable {
                dependency: "embedding provider".into(),
                reason: "embedding.endpoint is not configured".into(),
            }
        })?;

        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let response = self
                .client
                .post(format!("{endpoint}/embed"))
                .json(&serde_json::json!({ "texts": chunk }))
                .send()
                .await
                .map_err(|e| EngineError::DependencyUnavailable {
                    dependency: "embedding provider".into(),
                    reason: format!("request failed: {e}"),
                })?;
            if !response.status().is_success() {
                return Err(EngineError::DependencyUnavailable {
                    dependency: "embedding provider".into(),
                    reason: format!("provider returned {}", response.status()),
                });
            }
            let parsed: EmbedResponse =
                response
                    .json()
                    .await
                    .map_err(|e| EngineError::DependencyUnavailable {
                        dependency: "embedding provider".into(),
                        reason: format!("unparseable provider response: {e}"),
                    })?;
            if parsed.embeddings.len() != chunk.len() {
                return Err(EngineError::DependencyUnavailable {
                    dependency: "embedding provider".into(),
                    reason: format!(
                        "provider returned {} vectors for {} texts",
                        parsed.embeddings.len(),
                        chunk.len()
                    ),
                });
            }
            all.extend(parsed.embeddings);
        }
        Ok(all)
    }

    pub async fn embed_one(&self, text: &str) -> EngineResult<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors.pop().ok_or_else(|| EngineError::DependencyUnavailable {
            dependency: "embedding provider".into(),
            reason: "provider returned no vector".into(),
        })
    }

    /// Embed every symbol that has no embedding yet. Batch sizes follow the
    /// memory monitor's recommendation; a failing batch is logged and
    /// skipped, the rest continues. Returns the number embedded.
    pub async fn embed_missing_symbols(
        &self,
        db: &Arc<Mutex<SymbolDb>>,
        monitor: &MemoryPressureMonitor,
    ) -> EngineResult<usize> {
        if !self.is_available() {
            return Err(EngineError::DependencyUnavailable {
                dependency: "embedding provider".into(),
                reason: "embedding.endpoint is not configured".into(),
            });
        }

        let mut embedded = 0usize;
        loop {
            let batch_size = monitor.recommended_batch_size(self.batch_size);
            let pending = {
                let db = db.lock().await;
                db.symbols_without_embeddings(batch_size)?
            };
            if pending.is_empty() {
                break;
            }
            let texts: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
            match self.embed(&texts).await {
                Ok(vectors) => {
                    let db = db.lock().await;
                    for ((symbol, _), vector) in pending.iter().zip(vectors) {
                        if vector.len() != self.dimensions {
                            warn!(
                                "dimension mismatch for {} ({} != {}); skipping",
                                symbol.id,
                                vector.len(),
                                self.dimensions
                            );
                            continue;
                        }
                        db.put_embedding(&symbol.id, &vector)?;
                        embedded += 1;
                    }
                }
                Err(e) => {
                    // Skip this batch but keep the rest alive. Without marking
                    // progress we would loop on the same symbols, so stop here;
                    // a later call retries them.
                    warn!("embedding batch of {} failed: {e}", pending.len());
                    break;
                }
            }
            debug!("embedded {embedded} symbols so far");
        }
        Ok(embedded)
    }
}
