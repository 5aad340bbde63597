//! Configuration system for docqa.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Environment variables use the `DOCQA_` prefix with `__` as
//! the section separator (e.g. `DOCQA_RETRIEVAL__SEARCH_TOP_K=50`).
//!
//! The loaded configuration is validated once at startup; pipelines are
//! only ever constructed from a validated config.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for the docqa pipelines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocqaConfig {
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
}

/// Chunking and retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Collection (namespace) name in the vector store.
    pub collection_name: String,
    /// Chunk window size in tokens.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks. Must be < `chunk_size`.
    pub chunk_overlap: usize,
    /// Candidates fetched by first-stage similarity search.
    pub search_top_k: usize,
    /// Final candidate count after reranking. Must be <= `search_top_k`.
    pub rerank_top_k: usize,
    /// Token budget for the synthesis context window.
    pub context_max_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection_name: "documents".to_string(),
            chunk_size: 1000,
            chunk_overlap: 100,
            search_top_k: 50,
            rerank_top_k: 12,
            context_max_tokens: 24_000,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "voyage" or "local" (deterministic, offline).
    pub provider: String,
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Vector dimension; constant for the collection's lifetime.
    pub dimensions: usize,
    /// Maximum texts per embedding request (provider batch limit).
    pub batch_size: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "voyage".to_string(),
            model: "voyage-3".to_string(),
            api_key_env: "VOYAGE_API_KEY".to_string(),
            base_url: None,
            dimensions: 1024,
            batch_size: 128,
            timeout_secs: 30,
        }
    }
}

/// Configuration for the second-stage reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Provider name: "voyage" or "none" (similarity order only).
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: "voyage".to_string(),
            model: "rerank-2".to_string(),
            api_key_env: "VOYAGE_API_KEY".to_string(),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Configuration for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Provider name: "qdrant" or "memory" (in-process, for tests/offline).
    pub provider: String,
    pub url: String,
    /// Environment variable for the API key; unset means no auth header.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "qdrant".to_string(),
            url: "http://localhost:6333".to_string(),
            api_key_env: "QDRANT_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Configuration for the answer-synthesis LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "gemini".
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_output_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-pro".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: None,
            max_output_tokens: 2048,
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// Retry policy for transient external-service errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl DocqaConfig {
    /// Validate cross-field constraints. Called once at startup; invalid
    /// combinations fail fast before any pipeline is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(ConfigError::Invalid {
                message: format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    r.chunk_overlap, r.chunk_size
                ),
            });
        }
        if r.search_top_k == 0 || r.rerank_top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "search_top_k and rerank_top_k must be greater than zero".to_string(),
            });
        }
        if r.rerank_top_k > r.search_top_k {
            return Err(ConfigError::Invalid {
                message: format!(
                    "rerank_top_k ({}) must not exceed search_top_k ({})",
                    r.rerank_top_k, r.search_top_k
                ),
            });
        }
        if r.collection_name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "retrieval.collection_name".to_string(),
            });
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                message: "embedding.dimensions must be greater than zero".to_string(),
            });
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "embedding.batch_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration from defaults, an optional TOML file, and the
/// `DOCQA_`-prefixed environment, then validate it.
pub fn load_config(config_path: Option<&Path>) -> Result<DocqaConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DocqaConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("DOCQA_").split("__"));

    let config: DocqaConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
