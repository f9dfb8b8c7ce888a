use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Query, State};
use axum::{Form, Json};
use legal_rag_core::{SkippedFile, UploadedFile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FILES_FIELD: &str = "files";

/// `Query` that reports decoding failures as JSON errors.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Form` that reports decoding failures as JSON errors.
#[derive(FromRequest)]
#[from_request(via(Form), rejection(ApiError))]
pub struct ApiForm<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub conversation_id: String,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct TextForm {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub passages_indexed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn start_conversation(
    State(state): State<AppState>,
) -> Result<Json<StartResponse>, ApiError> {
    let conversation_id = state.pipeline.start_conversation().await?;
    Ok(Json(StartResponse { conversation_id }))
}

pub async fn upload(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ConversationParams>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(file_name, content_type, bytes.to_vec()));
    }

    let report = state
        .pipeline
        .upload_pdfs(&params.conversation_id, files)
        .await?;

    Ok(Json(UploadResponse {
        message: format!(
            "Uploaded {} PDF files and indexed {} pages to conversation {}",
            report.files_received, report.passages_indexed, report.conversation_id
        ),
        passages_indexed: report.passages_indexed,
        skipped: report.skipped,
    }))
}

pub async fn upload_text(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ConversationParams>,
    ApiForm(form): ApiForm<TextForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    let report = state
        .pipeline
        .upload_text(&params.conversation_id, &form.text)
        .await?;

    Ok(Json(MessageResponse {
        message: format!(
            "Uploaded text and indexed {} chunks to conversation {}",
            report.chunks_indexed, report.conversation_id
        ),
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ChatParams>,
) -> Result<Json<ChatResponse>, ApiError> {
    let answer = state
        .pipeline
        .chat(&params.conversation_id, &params.query)
        .await?;
    Ok(Json(ChatResponse {
        response: answer.response,
    }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ConversationParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .pipeline
        .delete_conversation(&params.conversation_id)
        .await?;
    Ok(Json(MessageResponse {
        message: format!("Conversation {} deleted.", params.conversation_id),
    }))
}
