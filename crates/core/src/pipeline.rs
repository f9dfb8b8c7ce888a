use crate::chunking::chunk_text;
use crate::embeddings::{Embedder, InputKind};
use crate::extractor::PdfExtractor;
use crate::ingest::{extract_pdf_batch_best_effort, validate_pdf_batch};
use crate::models::{
    ChatAnswer, IndexedPassage, PipelineOptions, SkippedFile, TextUploadReport, UploadReport,
    UploadedFile,
};
use crate::registry::{is_valid_conversation_id, CollectionHandle, ConversationRegistry};
use crate::reranker::rerank_with_fallback;
use crate::retriever::Retriever;
use crate::synthesizer::{AnswerSynthesizer, GenerationOptions, NO_CONTEXT_RESPONSE};
use crate::traits::{ChatModel, Reranker, VectorIndex};
use crate::{IngestError, PipelineError, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// The external collaborators a pipeline talks to.
pub struct PipelineComponents {
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub chat: Arc<dyn ChatModel>,
    pub extractor: Arc<dyn PdfExtractor>,
}

/// Upload path: extract → chunk → embed → insert.
/// Chat path: embed → search → rerank → synthesize.
pub struct RagPipeline {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    extractor: Arc<dyn PdfExtractor>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    registry: ConversationRegistry,
    options: PipelineOptions,
    // serializes collection create/drop with inserts; searches do not take it
    lifecycle: Mutex<()>,
}

impl RagPipeline {
    pub fn new(
        components: PipelineComponents,
        options: PipelineOptions,
        generation: GenerationOptions,
    ) -> Result<Self, PipelineError> {
        options.chunking.validate()?;
        if components.embedder.dimensions() != options.vector_dimension {
            return Err(PipelineError::Config(format!(
                "embedder produces {} dimensions but collections use {}",
                components.embedder.dimensions(),
                options.vector_dimension
            )));
        }
        if options.search_limit == 0 || options.rerank_top_k == 0 {
            return Err(PipelineError::Config(
                "search limit and rerank top-k must be positive".to_string(),
            ));
        }

        let retriever = Retriever::new(
            Arc::clone(&components.index),
            Arc::clone(&components.embedder),
            options.search_limit,
        )?;

        Ok(Self {
            index: components.index,
            embedder: components.embedder,
            reranker: components.reranker,
            extractor: components.extractor,
            retriever,
            synthesizer: AnswerSynthesizer::new(components.chat, generation),
            registry: ConversationRegistry::new(options.collection_prefix.clone()),
            options,
            lifecycle: Mutex::new(()),
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    pub async fn start_conversation(&self) -> Result<String, PipelineError> {
        let conversation_id = Uuid::new_v4().to_string();
        let collection = self.create_conversation(&conversation_id).await?;
        info!(%conversation_id, %collection, "started new conversation");
        Ok(conversation_id)
    }

    /// Creates an empty collection for the conversation, dropping any previous one.
    pub async fn create_conversation(&self, conversation_id: &str) -> Result<String, PipelineError> {
        let _guard = self.lifecycle.lock().await;
        let name = self.collection_for(conversation_id)?;

        if self.index.drop_collection(&name).await? {
            info!(collection = %name, "dropped existing collection");
        }
        self.index
            .create_collection(&name, self.options.vector_dimension)
            .await?;
        self.registry.register(conversation_id, 0);
        Ok(name)
    }

    /// Returns the conversation's handle, creating the collection if it is missing.
    pub async fn ensure_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Arc<CollectionHandle>, PipelineError> {
        let _guard = self.lifecycle.lock().await;
        let name = self.collection_for(conversation_id)?;

        if self.index.has_collection(&name).await? {
            if let Some(handle) = self.registry.get(conversation_id) {
                handle.touch();
                return Ok(handle);
            }
            let row_count = self.index.row_count(&name).await?;
            return Ok(self.registry.register(conversation_id, row_count));
        }

        self.index
            .create_collection(&name, self.options.vector_dimension)
            .await?;
        info!(%conversation_id, collection = %name, "created collection on first use");
        Ok(self.registry.register(conversation_id, 0))
    }

    pub async fn upload_pdfs(
        &self,
        conversation_id: &str,
        files: Vec<UploadedFile>,
    ) -> Result<UploadReport, PipelineError> {
        validate_pdf_batch(&files)?;
        let files_received = files.len();
        let handle = self.ensure_conversation(conversation_id).await?;

        let extractor = Arc::clone(&self.extractor);
        let report = tokio::task::spawn_blocking(move || {
            extract_pdf_batch_best_effort(extractor.as_ref(), &files)
        })
        .await
        .map_err(|error| IngestError::PdfParse(format!("extraction task failed: {error}")))??;

        let mut skipped = report.skipped_files;
        let mut processed_files = 0usize;
        let mut embedded: Vec<(String, Vec<f32>)> = Vec::new();

        for document in report.documents {
            let texts: Vec<String> = document.pages.into_iter().map(|page| page.text).collect();
            if texts.is_empty() {
                processed_files += 1;
                continue;
            }

            match self.embed_documents(&texts).await {
                Ok(vectors) => {
                    processed_files += 1;
                    embedded.extend(texts.into_iter().zip(vectors));
                }
                Err(error) => skipped.push(SkippedFile {
                    file_name: document.file_name,
                    reason: PipelineError::Embedding(error).to_string(),
                }),
            }
        }

        for file in &skipped {
            warn!(%conversation_id, file = %file.file_name, reason = %file.reason, "skipped pdf");
        }
        if processed_files == 0 {
            if let Some(first) = skipped.first() {
                return Err(IngestError::Extraction {
                    file: first.file_name.clone(),
                    reason: first.reason.clone(),
                }
                .into());
            }
        }

        let passages_indexed = embedded.len();
        let first_id = self.insert_passages(&handle, embedded).await?;
        info!(
            %conversation_id,
            files = files_received,
            passages = passages_indexed,
            skipped = skipped.len(),
            "indexed pdf pages"
        );

        Ok(UploadReport {
            conversation_id: conversation_id.to_string(),
            files_received,
            passages_indexed,
            first_id,
            skipped,
        })
    }

    pub async fn upload_text(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<TextUploadReport, PipelineError> {
        let chunks = chunk_text(text, self.options.chunking)?;
        let handle = self.ensure_conversation(conversation_id).await?;

        let vectors = self
            .embed_documents(&chunks)
            .await
            .map_err(PipelineError::Embedding)?;
        let chunks_indexed = chunks.len();
        let first_id = self
            .insert_passages(&handle, chunks.into_iter().zip(vectors).collect())
            .await?
            .unwrap_or_else(|| handle.next_id());
        info!(%conversation_id, chunks = chunks_indexed, "indexed text");

        Ok(TextUploadReport {
            conversation_id: conversation_id.to_string(),
            chunks_indexed,
            first_id,
        })
    }

    pub async fn chat(&self, conversation_id: &str, query: &str) -> Result<ChatAnswer, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let collection = self.collection_for(conversation_id)?;
        let candidates = self
            .retriever
            .retrieve(conversation_id, &collection, query)
            .await?;
        if let Some(handle) = self.registry.get(conversation_id) {
            handle.touch();
        }

        if candidates.is_empty() {
            return Ok(ChatAnswer {
                response: NO_CONTEXT_RESPONSE.to_string(),
                context: Vec::new(),
                reranked: false,
            });
        }

        let (context, reranked) = rerank_with_fallback(
            self.reranker.as_ref(),
            self.options.rerank_fallback,
            query,
            candidates,
            self.options.rerank_top_k,
        )
        .await?;

        let response = self
            .synthesizer
            .answer(query, &context)
            .await
            .map_err(PipelineError::Chat)?;

        Ok(ChatAnswer {
            response,
            context,
            reranked,
        })
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), PipelineError> {
        let _guard = self.lifecycle.lock().await;
        let name = self.collection_for(conversation_id)?;

        let existed = self.index.drop_collection(&name).await?;
        self.registry.remove(conversation_id);
        if !existed {
            return Err(PipelineError::UnknownConversation(
                conversation_id.to_string(),
            ));
        }

        info!(%conversation_id, collection = %name, "deleted conversation");
        Ok(())
    }

    /// Drops every conversation idle for at least `ttl`. Returns the evicted ids.
    pub async fn evict_idle(&self, ttl: Duration) -> Result<Vec<String>, PipelineError> {
        let mut evicted = Vec::new();
        for conversation_id in self.registry.idle_conversations(ttl) {
            let _guard = self.lifecycle.lock().await;
            let Some(handle) = self
                .registry
                .get(&conversation_id)
                .filter(|handle| handle.idle_for() >= ttl)
            else {
                continue;
            };

            self.index.drop_collection(handle.name()).await?;
            self.registry.remove(&conversation_id);
            info!(
                %conversation_id,
                collection = %handle.name(),
                created_at = %handle.created_at().to_rfc3339(),
                idle_secs = handle.idle_for().as_secs(),
                "evicted idle conversation"
            );
            evicted.push(conversation_id);
        }
        Ok(evicted)
    }

    /// Applies the configured idle TTL, if any.
    pub async fn evict_expired(&self) -> Result<Vec<String>, PipelineError> {
        match self.options.idle_ttl {
            Some(ttl) => self.evict_idle(ttl).await,
            None => Ok(Vec::new()),
        }
    }

    fn collection_for(&self, conversation_id: &str) -> Result<String, PipelineError> {
        if !is_valid_conversation_id(conversation_id) {
            return Err(PipelineError::InvalidConversationId(
                conversation_id.to_string(),
            ));
        }
        Ok(self.registry.collection_name(conversation_id))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let vectors = self.embedder.embed_batch(texts, InputKind::Document).await?;
        if vectors.len() != texts.len() {
            return Err(ProviderError::InvalidResponse {
                provider: "embedder",
                details: format!("{} embeddings for {} inputs", vectors.len(), texts.len()),
            });
        }
        Ok(vectors)
    }

    /// Assigns ids from the handle's counter and writes the passages in order.
    /// Returns the first assigned id, if anything was written. Fails when the
    /// collection was recreated, deleted or evicted since `handle` was taken.
    async fn insert_passages(
        &self,
        handle: &Arc<CollectionHandle>,
        embedded: Vec<(String, Vec<f32>)>,
    ) -> Result<Option<u64>, PipelineError> {
        if embedded.is_empty() {
            return Ok(None);
        }

        let _guard = self.lifecycle.lock().await;
        if !self.registry.is_current(handle) {
            warn!(
                conversation_id = %handle.conversation_id(),
                collection = %handle.name(),
                "collection changed during upload, discarding passages"
            );
            return Err(PipelineError::ConversationChanged(
                handle.conversation_id().to_string(),
            ));
        }

        let ids = handle.reserve_ids(embedded.len() as u64);
        let first_id = ids.start;
        let passages: Vec<IndexedPassage> = ids
            .zip(embedded)
            .map(|(id, (text, vector))| IndexedPassage { id, vector, text })
            .collect();

        self.index.insert(handle.name(), &passages).await?;
        handle.touch();
        Ok(Some(first_id))
    }
}
