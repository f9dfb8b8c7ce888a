pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod reranker;
pub mod retriever;
pub mod stores;
pub mod synthesizer;
pub mod traits;

pub use chunking::{chunk_text, normalize_whitespace, ChunkingConfig};
pub use embeddings::{Embedder, HashingEmbedder, InputKind, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ErrorKind, IngestError, PipelineError, ProviderError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{extract_pdf_batch_best_effort, validate_pdf_batch, IngestionReport};
pub use models::{
    ChatAnswer, IndexedPassage, PipelineOptions, RerankFallback, ScoredPassage, SkippedFile,
    TextUploadReport, UploadReport, UploadedFile,
};
pub use pipeline::{PipelineComponents, RagPipeline};
pub use providers::{OpenAiChat, RetryPolicy, VoyageConfig, VoyageEmbedder, VoyageReranker};
pub use registry::{
    collection_name, is_valid_conversation_id, CollectionHandle, ConversationRegistry,
};
pub use reranker::{rerank_with_fallback, EmbeddingReranker};
pub use retriever::{QueryNormalizer, Retriever};
pub use stores::{LocalIndex, QdrantStore};
pub use synthesizer::{AnswerSynthesizer, GenerationOptions};
pub use traits::{ChatModel, ChatRequest, Reranker, VectorIndex};
