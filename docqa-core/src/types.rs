//! Core data types shared across the ingestion and query pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an uploaded document as seen by callers.
///
/// A document is `Pending` while its ingestion pipeline is running,
/// `Ready` once every chunk has a vector in the index, and `Failed` if
/// any ingestion stage failed (partial writes rolled back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Ready,
    Failed,
}

/// An uploaded document tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    /// Chunk ids in ordinal order; populated when ingestion completes.
    pub chunk_ids: Vec<Uuid>,
    pub ingested_at: DateTime<Utc>,
    /// Human-readable failure reason when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Listing entry for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub chunk_count: usize,
}

/// A contiguous, token-bounded slice of a document's text.
///
/// Immutable once created; exists only as long as its parent document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Ordinal position within the document.
    pub index: usize,
    pub text: String,
    pub token_count: usize,
    /// Token span within the document's token sequence, `[start, end)`.
    pub token_start: usize,
    pub token_end: usize,
    /// Tokens shared with the previous chunk (0 for the first chunk).
    pub overlap_with_previous: usize,
}

/// A retrieval candidate returned by vector search, carrying the indexed
/// payload so later stages need no second lookup. Ephemeral, scoped to
/// one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub filename: String,
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// A candidate re-scored by the second-stage reranker. Ordering by
/// `score` supersedes similarity order for final context selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedCandidate {
    pub chunk_id: Uuid,
    pub score: f32,
}

/// A pointer from a generated answer back to the supporting chunk.
///
/// Always references a chunk that was part of the synthesis context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_index: usize,
    /// Excerpt of the cited chunk's text for presentation.
    pub text_span: String,
}

/// A generated answer with ordered citations. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// True when retrieval produced no candidates and the synthesizer was
    /// never invoked.
    pub no_evidence: bool,
}

impl Answer {
    /// The explicit result returned when the index has nothing relevant.
    pub fn no_evidence() -> Self {
        Self {
            text: "No relevant information was found in the uploaded documents.".to_string(),
            citations: Vec::new(),
            no_evidence: true,
        }
    }
}

impl Document {
    pub fn new(id: Uuid, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            status: DocumentStatus::Pending,
            chunk_ids: Vec::new(),
            ingested_at: Utc::now(),
            failure: None,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            filename: self.filename.clone(),
            status: self.status,
            chunk_count: self.chunk_ids.len(),
        }
    }
}
