//! Error types for the docqa core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering configuration, chunking, external-service, and document domains.

use uuid::Uuid;

/// Top-level error type for the docqa core library.
#[derive(Debug, thiserror::Error)]
pub enum DocqaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("Document {document_id} has no extractable text")]
    EmptyDocument { document_id: Uuid },

    #[error("Embedding service error: {0}")]
    Embedding(ServiceError),

    #[error("Vector store error: {0}")]
    VectorStore(ServiceError),

    #[error("Rerank service error: {0}")]
    Rerank(ServiceError),

    #[error("Synthesis service error: {0}")]
    Synthesis(ServiceError),

    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: Uuid },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
///
/// Configuration errors are fatal at startup; pipelines are never
/// constructed from an unvalidated config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the chunker.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Tokenizer error: {message}")]
    Tokenizer { message: String },
}

/// Errors from external-service interactions (embedding, vector store,
/// reranker, LLM). The wrapping `DocqaError` variant identifies the stage.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl ServiceError {
    /// Whether the error is transient and worth retrying with backoff.
    ///
    /// Auth and malformed-request/response errors are permanent and must
    /// surface immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited { .. }
                | ServiceError::Timeout { .. }
                | ServiceError::Connection { .. }
        )
    }
}

/// A type alias for results using the top-level `DocqaError`.
pub type Result<T> = std::result::Result<T, DocqaError>;
