use crate::error::ProviderError;
use crate::models::ScoredPassage;
use crate::traits::{ChatModel, ChatRequest};
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = "\
You are a highly knowledgeable legal AI assistant. Your task is to provide accurate and concise answers based solely on the provided legal context. Follow these instructions:
- Answer the user's question directly and precisely, sticking to the information in the context.
- Do not hallucinate or provide information outside the given context.
- Format your response in Markdown:
  - Use **bold** for legal article numbers (e.g., **Article 630**) and key legal terms.
  - Use numbered lists (1., 2., etc.) or bullet points (- ) for conditions, steps, or items.
  - Add line breaks between sections for readability.
- If the context does not contain enough information to fully answer the question, state this clearly and suggest how the user can refine their query.";

pub const NO_CONTEXT_RESPONSE: &str = "No relevant context found for your query.";

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1_500,
            temperature: 0.5,
        }
    }
}

pub fn build_context(passages: &[ScoredPassage]) -> String {
    passages
        .iter()
        .map(|passage| passage.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_prompt(context: &str, query: &str) -> String {
    format!("<context>\n{context}\n</context>\n<question>\n{query}\n</question>")
}

pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatModel>,
    options: GenerationOptions,
}

impl AnswerSynthesizer {
    pub fn new(chat: Arc<dyn ChatModel>, options: GenerationOptions) -> Self {
        Self { chat, options }
    }

    pub fn request(&self, query: &str, passages: &[ScoredPassage]) -> ChatRequest {
        ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_user_prompt(&build_context(passages), query),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        }
    }

    /// Returns the model's text unchanged.
    pub async fn answer(
        &self,
        query: &str,
        passages: &[ScoredPassage],
    ) -> Result<String, ProviderError> {
        self.chat.complete(&self.request(query, passages)).await
    }
}
