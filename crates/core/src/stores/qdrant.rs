use crate::error::SearchError;
use crate::models::{IndexedPassage, ScoredPassage};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BACKEND: &str = "qdrant";

/// Qdrant REST client. Collections use `Dot` distance, and writes wait for
/// the operation to be applied so a following search observes them.
pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.endpoint, name)
    }

    /// Drops every collection whose name starts with `prefix`, so a restart
    /// begins from an empty store. Returns how many were dropped.
    pub async fn reset_prefixed(&self, prefix: &str) -> Result<usize, SearchError> {
        let response = self
            .client
            .get(format!("{}/collections", self.endpoint))
            .send()
            .await?;
        let parsed = Self::check(response).await?;

        let stale = collection_names(&parsed)
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect::<Vec<_>>();
        for name in &stale {
            self.drop_collection(name).await?;
        }
        Ok(stale.len())
    }

    async fn check(response: reqwest::Response) -> Result<Value, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {body}"),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn has_collection(&self, name: &str) -> Result<bool, SearchError> {
        let response = self.client.get(self.collection_url(name)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check(response).await.map(|_| true),
        }
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), SearchError> {
        if self.has_collection(name).await? {
            self.drop_collection(name).await?;
        }

        let response = self
            .client
            .put(self.collection_url(name))
            .json(&json!({
                "vectors": {
                    "size": dimension,
                    "distance": "Dot",
                },
            }))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, SearchError> {
        let response = self.client.delete(self.collection_url(name)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let parsed = Self::check(response).await?;
        Ok(parsed.pointer("/result").and_then(Value::as_bool).unwrap_or(true))
    }

    async fn row_count(&self, name: &str) -> Result<u64, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url(name)))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::CollectionMissing(name.to_string()));
        }

        let parsed = Self::check(response).await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response has no result.count".to_string(),
            })
    }

    async fn insert(&self, name: &str, passages: &[IndexedPassage]) -> Result<(), SearchError> {
        if passages.is_empty() {
            return Ok(());
        }

        let points = passages
            .iter()
            .map(|passage| {
                json!({
                    "id": passage.id,
                    "vector": passage.vector,
                    "payload": { "text": passage.text },
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(name)))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::CollectionMissing(name.to_string()));
        }
        Self::check(response).await.map(|_| ())
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, SearchError> {
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url(name)))
            .json(&json!({
                "vector": query_vector,
                "limit": limit,
                "with_payload": ["text"],
            }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::CollectionMissing(name.to_string()));
        }

        let parsed = Self::check(response).await?;
        Ok(parse_hits(&parsed))
    }
}

fn collection_names(parsed: &Value) -> Vec<String> {
    parsed["result"]["collections"]
        .as_array()
        .map(|collections| {
            collections
                .iter()
                .filter_map(|collection| collection["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_hits(parsed: &Value) -> Vec<ScoredPassage> {
    parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let id = hit.pointer("/id").and_then(Value::as_u64)?;
                    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
                    let text = hit
                        .pointer("/payload/text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Some(ScoredPassage { id, text, score })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hits_are_parsed_in_response_order() {
        let response = json!({
            "result": [
                { "id": 4, "score": 0.92, "payload": { "text": "Article 630" } },
                { "id": 1, "score": 0.41, "payload": { "text": "Article 12" } },
                { "id": "uuid-ids-are-ignored", "score": 0.3, "payload": {} }
            ],
            "status": "ok"
        });

        let hits = parse_hits(&response);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 4);
        assert_eq!(hits[0].text, "Article 630");
        assert_eq!(hits[1].score, 0.41);
    }

    #[test]
    fn collection_listing_is_parsed() {
        let parsed = json!({
            "result": {
                "collections": [
                    {"name": "legal_rag_collection_a"},
                    {"name": "other"}
                ]
            }
        });

        assert_eq!(
            collection_names(&parsed),
            vec!["legal_rag_collection_a".to_string(), "other".to_string()]
        );
        assert!(collection_names(&json!({"result": {}})).is_empty());
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let store = QdrantStore::new("http://localhost:6333/");
        assert_eq!(
            store.collection_url("legal_rag_collection_a"),
            "http://localhost:6333/collections/legal_rag_collection_a"
        );
    }
}
