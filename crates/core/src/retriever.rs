use crate::chunking::normalize_whitespace;
use crate::embeddings::{Embedder, InputKind};
use crate::error::PipelineError;
use crate::models::ScoredPassage;
use crate::traits::VectorIndex;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

pub const CANONICAL_SUMMARY_QUERY: &str =
    "Summarize the main content of the document: its purpose, the parties involved, \
     their key rights and obligations, and the most important articles.";

const SUMMARY_PATTERN: &str = r"(?i)^(please\s+|can you\s+|could you\s+)?(summari[sz]e|give( me)? a summary( of)?|provide a summary( of)?|write a summary( of)?|summary( of)?|tóm tắt)(\s+(this|the|that|my)?\s*(document|file|text|pdf|contract|law|văn bản|tài liệu|hợp đồng)?)?\s*(please)?[\s.!?]*$";

/// Rewrites "summarize this document"-style requests into a query that
/// retrieves the passages a summary needs. Other queries pass through.
pub struct QueryNormalizer {
    summary: Regex,
}

impl QueryNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            summary: Regex::new(SUMMARY_PATTERN)?,
        })
    }

    pub fn normalize(&self, query: &str) -> String {
        let collapsed = normalize_whitespace(query);
        if self.summary.is_match(&collapsed) {
            CANONICAL_SUMMARY_QUERY.to_string()
        } else {
            collapsed
        }
    }
}

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    normalizer: QueryNormalizer,
    limit: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        limit: usize,
    ) -> Result<Self, PipelineError> {
        let normalizer = QueryNormalizer::new()
            .map_err(|error| PipelineError::Config(format!("query normalizer: {error}")))?;
        Ok(Self {
            index,
            embedder,
            normalizer,
            limit,
        })
    }

    /// Returns up to `limit` candidates for `query`, best first. A missing
    /// collection yields [`PipelineError::NoData`].
    pub async fn retrieve(
        &self,
        conversation_id: &str,
        collection: &str,
        query: &str,
    ) -> Result<Vec<ScoredPassage>, PipelineError> {
        if !self.index.has_collection(collection).await? {
            return Err(PipelineError::NoData(conversation_id.to_string()));
        }

        let search_query = self.normalizer.normalize(query);
        let query_vector = self
            .embedder
            .embed(&search_query, InputKind::Query)
            .await
            .map_err(PipelineError::Embedding)?;

        let candidates = self
            .index
            .search(collection, &query_vector, self.limit)
            .await?;
        debug!(
            collection,
            candidates = candidates.len(),
            rewritten = search_query != query,
            "retrieved candidates"
        );
        Ok(candidates)
    }
}
