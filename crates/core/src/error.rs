use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("File {0} is not a PDF.")]
    NotPdf(String),

    #[error("Failed to process {file}: {reason}")]
    Extraction { file: String, reason: String },

    #[error("no files were uploaded")]
    NoFiles,

    #[error("Text content is empty.")]
    EmptyText,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("collection {0} does not exist")]
    CollectionMissing(String),

    #[error("vector dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid response from {provider}: {details}")]
    InvalidResponse {
        provider: &'static str,
        details: String,
    },

    #[error("missing api key for {0}")]
    MissingApiKey(&'static str),
}

/// Coarse classification used by the transport layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Index(#[from] SearchError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    #[error("reranking failed: {0}")]
    Rerank(#[source] ProviderError),

    #[error("Error processing the request: {0}")]
    Chat(#[source] ProviderError),

    #[error("query is empty")]
    EmptyQuery,

    #[error("invalid conversation id {0:?}: use letters, digits, '-' or '_'")]
    InvalidConversationId(String),

    #[error("Conversation {0} does not exist.")]
    UnknownConversation(String),

    #[error("Conversation {0} does not exist or has no data.")]
    NoData(String),

    #[error("Conversation {0} was reset or deleted during the upload.")]
    ConversationChanged(String),

    #[error("invalid pipeline config: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingest(IngestError::Io(_)) | Self::Ingest(IngestError::InvalidChunkConfig(_)) => {
                ErrorKind::Internal
            }
            Self::Ingest(_) | Self::EmptyQuery | Self::InvalidConversationId(_) => {
                ErrorKind::Validation
            }
            Self::UnknownConversation(_) | Self::NoData(_) => ErrorKind::NotFound,
            Self::ConversationChanged(_) => ErrorKind::Conflict,
            Self::Embedding(_) | Self::Rerank(_) | Self::Chat(_) => ErrorKind::Upstream,
            Self::Index(SearchError::Http(_)) | Self::Index(SearchError::BackendResponse { .. }) => {
                ErrorKind::Upstream
            }
            Self::Index(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_name_the_offending_file() {
        let error = PipelineError::from(IngestError::NotPdf("notes.docx".to_string()));
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.to_string(), "File notes.docx is not a PDF.");
    }

    #[test]
    fn provider_failures_are_upstream() {
        let error = PipelineError::Chat(ProviderError::MissingApiKey("chat"));
        assert_eq!(error.kind(), ErrorKind::Upstream);
        assert!(error.to_string().starts_with("Error processing the request"));
    }

    #[test]
    fn missing_conversations_are_not_found() {
        assert_eq!(
            PipelineError::NoData("abc".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            PipelineError::UnknownConversation("abc".to_string()).to_string(),
            "Conversation abc does not exist."
        );
    }
}
