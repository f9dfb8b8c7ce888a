use clap::{Parser, ValueEnum};
use legal_rag_core::{
    ChunkingConfig, GenerationOptions, PipelineOptions, RerankFallback, RetryPolicy,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// In-process index, snapshotted under `--store-path`.
    Local,
    /// Remote Qdrant instance.
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderBackend {
    Voyage,
    /// Offline character-trigram vectors.
    Hashing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RerankerBackend {
    Voyage,
    /// Rescore candidates with the configured embedder.
    Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FallbackMode {
    /// Keep the retrieval order, truncated to top-k.
    Unranked,
    /// Fail the question.
    FailClosed,
}

impl From<FallbackMode> for RerankFallback {
    fn from(mode: FallbackMode) -> Self {
        match mode {
            FallbackMode::Unranked => Self::Unranked,
            FallbackMode::FailClosed => Self::FailClosed,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "legal-rag-server", version, about = "Question answering over uploaded legal documents")]
pub struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "LEGAL_RAG_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "LEGAL_RAG_STORE", value_enum, default_value = "local")]
    pub store: StoreBackend,

    /// Wiped and recreated at startup.
    #[arg(long, env = "LEGAL_RAG_STORE_PATH", default_value = "./legal_rag_store")]
    pub store_path: PathBuf,

    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    #[arg(long, env = "LEGAL_RAG_COLLECTION_PREFIX", default_value = "legal_rag_collection_")]
    pub collection_prefix: String,

    #[arg(long, env = "VOYAGE_API_KEY", default_value = "", hide_env_values = true)]
    pub voyage_api_key: String,

    #[arg(long, env = "VOYAGE_BASE_URL", default_value = legal_rag_core::providers::voyage::DEFAULT_VOYAGE_BASE_URL)]
    pub voyage_base_url: String,

    #[arg(long, env = "LEGAL_RAG_EMBEDDER", value_enum, default_value = "voyage")]
    pub embedder: EmbedderBackend,

    #[arg(long, env = "LEGAL_RAG_EMBEDDING_MODEL", default_value = "voyage-law-2")]
    pub embedding_model: String,

    #[arg(long, env = "LEGAL_RAG_DIMENSION", default_value_t = 1024)]
    pub dimension: usize,

    #[arg(long, env = "LEGAL_RAG_RERANKER", value_enum, default_value = "voyage")]
    pub reranker: RerankerBackend,

    #[arg(long, env = "LEGAL_RAG_RERANK_MODEL", default_value = "rerank-2")]
    pub rerank_model: String,

    /// What to do when reranking fails.
    #[arg(long, env = "LEGAL_RAG_RERANK_FALLBACK", value_enum, default_value = "unranked")]
    pub rerank_fallback: FallbackMode,

    /// OpenAI-compatible endpoint; defaults to a local Ollama.
    #[arg(long, env = "LEGAL_RAG_CHAT_BASE_URL", default_value = "http://localhost:11434/v1")]
    pub chat_base_url: String,

    #[arg(long, env = "LEGAL_RAG_CHAT_MODEL", default_value = "llama3.2:3b")]
    pub chat_model: String,

    #[arg(long, env = "LEGAL_RAG_CHAT_API_KEY", default_value = "ollama", hide_env_values = true)]
    pub chat_api_key: String,

    #[arg(long, env = "LEGAL_RAG_MAX_TOKENS", default_value_t = 1500)]
    pub max_tokens: u32,

    #[arg(long, env = "LEGAL_RAG_TEMPERATURE", default_value_t = 0.5)]
    pub temperature: f32,

    #[arg(long, env = "LEGAL_RAG_CHUNK_SIZE", default_value_t = 3000)]
    pub chunk_size: usize,

    #[arg(long, env = "LEGAL_RAG_CHUNK_OVERLAP", default_value_t = 300)]
    pub chunk_overlap: usize,

    /// Candidates fetched from the index per question.
    #[arg(long, env = "LEGAL_RAG_SEARCH_LIMIT", default_value_t = 10)]
    pub search_limit: usize,

    /// Passages kept after reranking.
    #[arg(long, env = "LEGAL_RAG_TOP_K", default_value_t = 3)]
    pub top_k: usize,

    #[arg(long, env = "LEGAL_RAG_PROVIDER_TIMEOUT_SECS", default_value_t = 60)]
    pub provider_timeout_secs: u64,

    #[arg(long, env = "LEGAL_RAG_PROVIDER_RETRIES", default_value_t = 3)]
    pub provider_retries: u32,

    /// Idle conversations are dropped after this many seconds. 0 keeps them forever.
    #[arg(long, env = "LEGAL_RAG_IDLE_TTL_SECS", default_value_t = 86_400)]
    pub idle_ttl_secs: u64,

    #[arg(long, env = "LEGAL_RAG_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,

    /// Comma-separated origins, or `*`.
    #[arg(long, env = "LEGAL_RAG_CORS_ORIGINS", default_value = "*", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "LEGAL_RAG_MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Cli {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            collection_prefix: self.collection_prefix.clone(),
            vector_dimension: self.dimension,
            chunking: ChunkingConfig {
                max_chars: self.chunk_size,
                overlap_chars: self.chunk_overlap,
            },
            search_limit: self.search_limit,
            rerank_top_k: self.top_k,
            rerank_fallback: self.rerank_fallback.into(),
            idle_ttl: (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs)),
        }
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.provider_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_reference_deployment() {
        let cli = Cli::parse_from(["legal-rag-server"]);
        let options = cli.pipeline_options();

        assert_eq!(cli.bind.port(), 8000);
        assert_eq!(cli.store, StoreBackend::Local);
        assert_eq!(options.collection_prefix, "legal_rag_collection_");
        assert_eq!(options.vector_dimension, 1024);
        assert_eq!(options.chunking.max_chars, 3000);
        assert_eq!(options.chunking.overlap_chars, 300);
        assert_eq!(options.search_limit, 10);
        assert_eq!(options.rerank_top_k, 3);
        assert_eq!(options.rerank_fallback, RerankFallback::Unranked);
        assert_eq!(options.idle_ttl, Some(Duration::from_secs(86_400)));
        assert_eq!(cli.cors_origins, vec!["*".to_string()]);
        assert_eq!(cli.generation_options().max_tokens, 1500);
    }

    #[test]
    fn zero_ttl_disables_eviction() {
        let cli = Cli::parse_from([
            "legal-rag-server",
            "--idle-ttl-secs",
            "0",
            "--rerank-fallback",
            "fail-closed",
            "--embedder",
            "hashing",
        ]);

        assert_eq!(cli.pipeline_options().idle_ttl, None);
        assert_eq!(cli.rerank_fallback, FallbackMode::FailClosed);
        assert_eq!(
            cli.pipeline_options().rerank_fallback,
            RerankFallback::FailClosed
        );
        assert_eq!(cli.embedder, EmbedderBackend::Hashing);
    }

    #[test]
    fn unknown_fallback_modes_are_refused() {
        let parsed = Cli::try_parse_from(["legal-rag-server", "--rerank-fallback", "sometimes"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let cli = Cli::parse_from([
            "legal-rag-server",
            "--cors-origins",
            "http://localhost:3000,https://example.org",
        ]);

        assert_eq!(cli.cors_origins.len(), 2);
    }
}
