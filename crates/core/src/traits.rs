use crate::error::{ProviderError, SearchError};
use crate::models::{IndexedPassage, ScoredPassage};
use async_trait::async_trait;

/// A vector store holding one collection per conversation. Collections use
/// inner-product similarity, and a completed write is visible to every later read.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool, SearchError>;

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), SearchError>;

    /// Returns whether a collection was actually removed.
    async fn drop_collection(&self, name: &str) -> Result<bool, SearchError>;

    async fn row_count(&self, name: &str) -> Result<u64, SearchError>;

    async fn insert(&self, name: &str, passages: &[IndexedPassage]) -> Result<(), SearchError>;

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, SearchError>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns at most `top_k` candidates, most relevant first.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredPassage>,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}
