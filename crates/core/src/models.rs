use crate::chunking::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A passage ready to be written into a conversation collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedPassage {
    pub id: u64,
    pub vector: Vec<f32>,
    pub text: String,
}

/// A passage returned by a similarity search or a reranker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    pub id: u64,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Only the declared media type is checked; parameters such as `charset` are ignored.
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/pdf"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub conversation_id: String,
    pub files_received: usize,
    pub passages_indexed: usize,
    pub first_id: Option<u64>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextUploadReport {
    pub conversation_id: String,
    pub chunks_indexed: usize,
    pub first_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub response: String,
    pub context: Vec<ScoredPassage>,
    pub reranked: bool,
}

/// What to do when the rerank provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerankFallback {
    /// Keep the retrieval order and truncate it to top-k.
    #[default]
    Unranked,
    /// Fail the request.
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub collection_prefix: String,
    pub vector_dimension: usize,
    pub chunking: ChunkingConfig,
    pub search_limit: usize,
    pub rerank_top_k: usize,
    pub rerank_fallback: RerankFallback,
    pub idle_ttl: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            collection_prefix: "legal_rag_collection_".to_string(),
            vector_dimension: 1024,
            chunking: ChunkingConfig::default(),
            search_limit: 10,
            rerank_top_k: 3,
            rerank_fallback: RerankFallback::Unranked,
            idle_ttl: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_detection_uses_declared_media_type() {
        let pdf = UploadedFile::new("a.pdf", Some("application/pdf".to_string()), b"x".to_vec());
        let with_params = UploadedFile::new(
            "b.pdf",
            Some("Application/PDF; name=b.pdf".to_string()),
            b"x".to_vec(),
        );
        let renamed = UploadedFile::new("c.pdf", Some("text/plain".to_string()), b"x".to_vec());
        let undeclared = UploadedFile::new("d.pdf", None, b"x".to_vec());

        assert!(pdf.is_pdf());
        assert!(with_params.is_pdf());
        assert!(!renamed.is_pdf());
        assert!(!undeclared.is_pdf());
    }
}
