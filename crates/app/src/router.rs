use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState, cors_origins: &[String], max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/start_conversation", get(handlers::start_conversation))
        .route("/upload", post(handlers::upload))
        .route("/upload_text", post(handlers::upload_text))
        .route("/chat", get(handlers::chat))
        .route("/delete_conversation", delete(handlers::delete_conversation))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let allowed = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use legal_rag_core::{
        ChatModel, ChatRequest, EmbeddingReranker, GenerationOptions, HashingEmbedder,
        LocalIndex, LopdfExtractor, PipelineComponents, PipelineOptions, ProviderError,
        RagPipeline,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "legal-rag-test-boundary";
    const STATUTE: &str = "Article 630. A will made by a person of sound mind is valid when it is witnessed by two persons.";

    struct EchoChat;

    #[async_trait]
    impl ChatModel for EchoChat {
        async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
            Ok(request.user.clone())
        }
    }

    fn app() -> Router {
        let embedder = Arc::new(HashingEmbedder::default());
        let pipeline = RagPipeline::new(
            PipelineComponents {
                index: Arc::new(LocalIndex::in_memory()),
                embedder: embedder.clone(),
                reranker: Arc::new(EmbeddingReranker::new(embedder)),
                chat: Arc::new(EchoChat),
                extractor: Arc::new(LopdfExtractor),
            },
            PipelineOptions::default(),
            GenerationOptions::default(),
        )
        .unwrap();
        router(AppState::new(pipeline), &["*".to_string()], 1024 * 1024)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn text_request(conversation_id: &str, text: &str) -> Request<Body> {
        let encoded: String = text
            .bytes()
            .map(|byte| match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_' => {
                    (byte as char).to_string()
                }
                b' ' => "+".to_string(),
                other => format!("%{other:02X}"),
            })
            .collect();
        Request::builder()
            .method("POST")
            .uri(format!("/upload_text?conversation_id={conversation_id}"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("text={encoded}")))
            .unwrap()
    }

    fn multipart_request(conversation_id: &str, file_name: &str, content_type: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n\
             not really a document\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri(format!("/upload?conversation_id={conversation_id}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn start(app: &Router) -> String {
        let (status, json) = send(app, get_request("/start_conversation")).await;
        assert_eq!(status, StatusCode::OK);
        json["conversation_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, json) = send(&app(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn text_upload_then_chat_answers_from_context() {
        let app = app();
        let conversation_id = start(&app).await;

        let (status, json) = send(&app, text_request(&conversation_id, STATUTE)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["message"],
            format!("Uploaded text and indexed 1 chunks to conversation {conversation_id}")
        );

        let (status, json) = send(
            &app,
            get_request(&format!(
                "/chat?conversation_id={conversation_id}&query=witnessed+by+two+persons"
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["response"]
            .as_str()
            .unwrap()
            .contains("witnessed by two persons"));
    }

    #[tokio::test]
    async fn empty_text_is_a_bad_request() {
        let app = app();
        let conversation_id = start(&app).await;

        let (status, json) = send(&app, text_request(&conversation_id, "")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Text content is empty.");
    }

    #[tokio::test]
    async fn non_pdf_upload_names_the_file() {
        let app = app();
        let conversation_id = start(&app).await;

        let (status, json) = send(
            &app,
            multipart_request(&conversation_id, "brief.txt", "text/plain"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "File brief.txt is not a PDF.");
    }

    #[tokio::test]
    async fn unreadable_pdf_is_reported() {
        let app = app();
        let conversation_id = start(&app).await;

        let (status, json) = send(
            &app,
            multipart_request(&conversation_id, "scan.pdf", "application/pdf"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to process scan.pdf"));
    }

    #[tokio::test]
    async fn missing_query_parameters_are_reported_as_json() {
        let app = app();

        let (status, json) = send(&app, get_request("/chat?query=anything")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("conversation_id"));

        let delete = Request::builder()
            .method("DELETE")
            .uri("/delete_conversation")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, delete).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_upload_bodies_are_reported_as_json() {
        let app = app();
        let conversation_id = start(&app).await;

        let no_form = Request::builder()
            .method("POST")
            .uri(format!("/upload_text?conversation_id={conversation_id}"))
            .body(Body::from("text=hello"))
            .unwrap();
        let (status, json) = send(&app, no_form).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(json["error"].is_string());

        let no_multipart = Request::builder()
            .method("POST")
            .uri(format!("/upload?conversation_id={conversation_id}"))
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, json) = send(&app, no_multipart).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn chat_on_unknown_conversation_is_not_found() {
        let (status, json) = send(
            &app(),
            get_request("/chat?conversation_id=missing&query=anything"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            json["error"],
            "Conversation missing does not exist or has no data."
        );
    }

    #[tokio::test]
    async fn delete_removes_the_conversation() {
        let app = app();
        let conversation_id = start(&app).await;
        let uri = format!("/delete_conversation?conversation_id={conversation_id}");
        let delete_request = |uri: &str| {
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };

        let (status, json) = send(&app, delete_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], format!("Conversation {conversation_id} deleted."));

        let (status, json) = send(&app, delete_request(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            json["error"],
            format!("Conversation {conversation_id} does not exist.")
        );
    }
}
