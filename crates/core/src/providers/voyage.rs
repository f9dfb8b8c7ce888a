use super::{endpoint, send_with_retry, RetryPolicy};
use crate::embeddings::{Embedder, InputKind};
use crate::error::ProviderError;
use crate::models::ScoredPassage;
use crate::traits::Reranker;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "voyage";

pub const DEFAULT_VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";

#[derive(Debug, Clone)]
pub struct VoyageConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl VoyageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_VOYAGE_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    fn client(&self) -> Result<Client, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey(PROVIDER));
        }
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'static str,
    truncation: bool,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for the Voyage embeddings API (`voyage-law-2` by default).
pub struct VoyageEmbedder {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl VoyageEmbedder {
    pub fn new(
        config: &VoyageConfig,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            endpoint: endpoint(&config.base_url, "embeddings")?,
            api_key: config.api_key.trim().to_string(),
            model: model.into(),
            dimensions,
            batch_size: 64,
            retry: config.retry,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn embed_chunk(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
            input_type: kind.as_str(),
            truncation: true,
        };

        let response = send_with_retry(PROVIDER, self.retry, || {
            self.client
                .post(self.endpoint.clone())
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER,
                details: format!(
                    "{} embeddings returned for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        parsed
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() == self.dimensions {
                    Ok(entry.embedding)
                } else {
                    Err(ProviderError::InvalidResponse {
                        provider: PROVIDER,
                        details: format!(
                            "embedding dimension {} != {}",
                            entry.embedding.len(),
                            self.dimensions
                        ),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_chunk(batch, kind).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
    model: &'a str,
    top_k: usize,
    truncation: bool,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    data: Vec<RerankData>,
}

#[derive(Debug, Deserialize)]
struct RerankData {
    index: usize,
    relevance_score: f64,
}

/// Client for the Voyage rerank API. Over-long documents are truncated by the provider.
pub struct VoyageReranker {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl VoyageReranker {
    pub fn new(config: &VoyageConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            endpoint: endpoint(&config.base_url, "rerank")?,
            api_key: config.api_key.trim().to_string(),
            model: model.into(),
            retry: config.retry,
        })
    }
}

#[async_trait]
impl Reranker for VoyageReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, ProviderError> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query,
            documents: candidates.iter().map(|passage| passage.text.as_str()).collect(),
            model: &self.model,
            top_k: top_k.min(candidates.len()),
            truncation: true,
        };

        let response = send_with_retry(PROVIDER, self.retry, || {
            self.client
                .post(self.endpoint.clone())
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let parsed: RerankResponse = response.json().await?;
        apply_relevance(candidates, parsed.data, top_k)
    }
}

fn apply_relevance(
    candidates: Vec<ScoredPassage>,
    ranking: Vec<RerankData>,
    top_k: usize,
) -> Result<Vec<ScoredPassage>, ProviderError> {
    let mut ranked = Vec::with_capacity(ranking.len());
    for entry in ranking {
        let candidate = candidates
            .get(entry.index)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER,
                details: format!(
                    "rerank index {} out of range for {} documents",
                    entry.index,
                    candidates.len()
                ),
            })?;
        ranked.push(ScoredPassage {
            score: entry.relevance_score,
            ..candidate.clone()
        });
    }

    ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
    ranked.truncate(top_k);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: u64, text: &str) -> ScoredPassage {
        ScoredPassage {
            id,
            text: text.to_string(),
            score: 0.0,
        }
    }

    #[test]
    fn relevance_is_mapped_back_to_candidates() {
        let candidates = vec![passage(0, "a"), passage(1, "b"), passage(2, "c")];
        let ranking = vec![
            RerankData {
                index: 2,
                relevance_score: 0.9,
            },
            RerankData {
                index: 0,
                relevance_score: 0.4,
            },
        ];

        let ranked = apply_relevance(candidates, ranking, 3).unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[1].id, 0);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let ranking = vec![RerankData {
            index: 5,
            relevance_score: 0.1,
        }];
        assert!(apply_relevance(vec![passage(0, "a")], ranking, 1).is_err());
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = VoyageConfig::new("  ");
        assert!(matches!(
            VoyageEmbedder::new(&config, "voyage-law-2", 1024),
            Err(ProviderError::MissingApiKey("voyage"))
        ));
    }

    #[test]
    fn embedding_request_uses_input_type() {
        let input = vec!["a".to_string()];
        let request = EmbeddingRequest {
            input: &input,
            model: "voyage-law-2",
            input_type: InputKind::Query.as_str(),
            truncation: true,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["input_type"], "query");
        assert_eq!(body["model"], "voyage-law-2");
    }
}
