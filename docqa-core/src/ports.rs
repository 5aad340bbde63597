//! Capability ports for the external services the pipelines orchestrate.
//!
//! Each external dependency (embedding model, vector store, reranker, LLM)
//! is expressed as a narrow async trait so it can be substituted with a
//! deterministic in-process implementation in tests. The pipelines depend
//! only on these traits, never on concrete providers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::types::{Chunk, RerankedCandidate, ScoredChunk};

/// Whether a text is embedded for indexing or for search. Asymmetric
/// embedding models produce different vectors for each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedInput {
    Document,
    Query,
}

/// Converts texts into dense vectors via an embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving input order. The implementation
    /// splits oversized batches to stay within the provider limit.
    ///
    /// Guarantee: `output.len() == texts.len()`, and every vector has
    /// `self.dimensions()` components.
    async fn embed(
        &self,
        texts: &[String],
        input: EmbedInput,
    ) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Vector dimension; constant for a given deployment.
    fn dimensions(&self) -> usize;

    /// Provider name for logging.
    fn provider_name(&self) -> &str;
}

/// A (chunk, vector) pair staged for upsert into the vector store.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Source filename, stored in the payload for citation presentation.
    pub filename: String,
}

/// Adapter over the external vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), ServiceError>;

    /// Upsert points keyed by chunk id. Idempotent: re-upserting the same
    /// chunk id overwrites the stored vector and payload.
    async fn upsert(&self, points: &[IndexPoint]) -> Result<(), ServiceError>;

    /// Similarity search, sorted by descending cosine similarity with
    /// stable (insertion-order) tie-breaking.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError>;

    /// Remove every vector belonging to `document_id`, atomically from the
    /// caller's perspective. Returns the number of points removed; zero
    /// when the document had nothing indexed.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<usize, ServiceError>;
}

/// Second-stage relevance scorer over an initial candidate set.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Re-score `candidates` against `query` and return the best `top_k`,
    /// sorted by descending rerank score. `top_k` larger than the
    /// candidate count is clamped, not an error.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredChunk],
        top_k: usize,
    ) -> Result<Vec<RerankedCandidate>, ServiceError>;
}

/// Raw text-completion client for the answer-synthesis stage. Context
/// construction and citation resolution are core logic (`synthesis`
/// module); this port only runs the model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;

    /// Model name for logging.
    fn model_name(&self) -> &str;
}
