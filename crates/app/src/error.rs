use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use legal_rag_core::{ErrorKind, PipelineError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The request could not be decoded into the handler's inputs.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::Pipeline(error) => match error.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::Rejected {
            status: error.status(),
            message: error.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_rag_core::{IngestError, ProviderError};

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (
                ApiError::from(PipelineError::from(IngestError::EmptyText)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(PipelineError::UnknownConversation("x".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(PipelineError::ConversationChanged("x".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(PipelineError::Chat(ProviderError::MissingApiKey("chat"))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(PipelineError::Config("bad".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Rejected {
                    status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    message: "missing content type".to_string(),
                },
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error:?}");
        }
    }

    #[test]
    fn display_is_the_client_message() {
        let error = ApiError::from(PipelineError::ConversationChanged("conv".to_string()));
        assert_eq!(
            error.to_string(),
            "Conversation conv was reset or deleted during the upload."
        );
    }
}
