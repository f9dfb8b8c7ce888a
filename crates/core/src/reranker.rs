use crate::embeddings::{inner_product, Embedder, InputKind};
use crate::error::{PipelineError, ProviderError};
use crate::models::{RerankFallback, ScoredPassage};
use crate::traits::Reranker;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Scores each candidate by the inner product of independently computed
/// query and document embeddings.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, ProviderError> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query, InputKind::Query).await?;
        let texts: Vec<String> = candidates
            .iter()
            .map(|passage| passage.text.clone())
            .collect();
        let vectors = self
            .embedder
            .embed_batch(&texts, InputKind::Document)
            .await?;
        if vectors.len() != candidates.len() {
            return Err(ProviderError::InvalidResponse {
                provider: "embedder",
                details: format!(
                    "{} embeddings returned for {} candidates",
                    vectors.len(),
                    candidates.len()
                ),
            });
        }

        let mut scored: Vec<ScoredPassage> = candidates
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| ScoredPassage {
                score: inner_product(&query_vector, &vector),
                ..passage
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Runs the reranker and applies the configured fallback when it fails.
/// Returns the passages and whether they were actually reranked.
pub async fn rerank_with_fallback(
    reranker: &dyn Reranker,
    fallback: RerankFallback,
    query: &str,
    candidates: Vec<ScoredPassage>,
    top_k: usize,
) -> Result<(Vec<ScoredPassage>, bool), PipelineError> {
    match reranker.rerank(query, candidates.clone(), top_k).await {
        Ok(ranked) => Ok((ranked, true)),
        Err(error) => match fallback {
            RerankFallback::FailClosed => Err(PipelineError::Rerank(error)),
            RerankFallback::Unranked => {
                warn!(%error, "rerank failed, using retrieval order");
                let mut unranked = candidates;
                unranked.truncate(top_k);
                Ok((unranked, false))
            }
        },
    }
}
