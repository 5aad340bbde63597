//! Document ingestion pipeline.
//!
//! Drives an uploaded document through an explicit staged state machine:
//! `Received -> Chunked -> Embedded -> Indexed -> Ready`, with `Failed`
//! reachable from any stage. A failed transition carries the cleanup it
//! owes, so partial index writes are rolled back by the driver rather
//! than by implicit unwinding, and the index never serves chunks from a
//! document that is not `Ready`.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::chunker::TokenChunker;
use crate::config::{DocqaConfig, RetryConfig};
use crate::error::{DocqaError, Result, ServiceError};
use crate::ports::{EmbedInput, Embedder, IndexPoint, VectorIndex};
use crate::providers::with_retry;
use crate::registry::DocumentRegistry;
use crate::types::{Chunk, Document};

/// Ingestion stages, each carrying the prior stage's full output.
enum IngestState {
    Received { text: String },
    Chunked { chunks: Vec<Chunk> },
    Embedded { points: Vec<IndexPoint> },
    Indexed { chunk_ids: Vec<Uuid> },
    Ready { chunk_ids: Vec<Uuid> },
    Failed { error: DocqaError, rollback: Rollback },
}

impl IngestState {
    fn name(&self) -> &'static str {
        match self {
            IngestState::Received { .. } => "received",
            IngestState::Chunked { .. } => "chunked",
            IngestState::Embedded { .. } => "embedded",
            IngestState::Indexed { .. } => "indexed",
            IngestState::Ready { .. } => "ready",
            IngestState::Failed { .. } => "failed",
        }
    }
}

/// Cleanup owed by a failed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rollback {
    /// Nothing was written to the index.
    Nothing,
    /// The upsert may have partially landed; delete the document's vectors.
    DeleteVectors,
}

/// Ingestion pipeline over a registry, an embedder, and a vector index.
pub struct IngestPipeline {
    registry: Arc<DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunker: TokenChunker,
    batch_size: usize,
    retry: RetryConfig,
}

impl IngestPipeline {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &DocqaConfig,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            embedder,
            index,
            chunker: TokenChunker::from_config(&config.retrieval)?,
            batch_size: config.embedding.batch_size,
            retry: config.retry.clone(),
        })
    }

    /// Ingest a document's extracted text under a fresh id.
    ///
    /// Returns the `Ready` document record on success. On failure the
    /// record is left `Failed` with a reason and the error is returned;
    /// any partially indexed vectors are removed first.
    #[instrument(skip(self, text), fields(filename = filename))]
    pub async fn ingest(&self, filename: &str, text: &str) -> Result<Document> {
        let id = Uuid::new_v4();
        self.registry.register(id, filename).await;

        let mut state = IngestState::Received {
            text: text.to_string(),
        };
        let outcome = loop {
            match state {
                IngestState::Ready { chunk_ids } => break Ok(chunk_ids),
                IngestState::Failed { error, rollback } => {
                    if rollback == Rollback::DeleteVectors {
                        self.rollback(id).await;
                    }
                    break Err(error);
                }
                current => {
                    state = self.advance(id, filename, current).await;
                    info!(document_id = %id, stage = state.name(), "Ingestion stage");
                }
            }
        };

        match outcome {
            Ok(chunk_ids) => {
                self.registry.mark_ready(id, chunk_ids).await?;
                let doc = self.registry.get(id).await?;
                info!(
                    document_id = %id,
                    chunks = doc.chunk_ids.len(),
                    "Document ingested"
                );
                Ok(doc)
            }
            Err(e) => {
                if let Err(mark_err) = self.registry.mark_failed(id, &e.to_string()).await {
                    warn!(document_id = %id, error = %mark_err, "Failed to record ingestion failure");
                }
                Err(e)
            }
        }
    }

    /// Run one stage transition. Each arm consumes the prior stage's
    /// output whole; no stage starts on partial input.
    async fn advance(&self, id: Uuid, filename: &str, state: IngestState) -> IngestState {
        match state {
            IngestState::Received { text } => match self.chunker.chunk(id, &text) {
                Ok(chunks) if chunks.is_empty() => IngestState::Failed {
                    error: DocqaError::EmptyDocument { document_id: id },
                    rollback: Rollback::Nothing,
                },
                Ok(chunks) => IngestState::Chunked { chunks },
                Err(e) => IngestState::Failed {
                    error: e.into(),
                    rollback: Rollback::Nothing,
                },
            },

            IngestState::Chunked { chunks } => match self.embed_chunks(&chunks).await {
                Ok(vectors) => IngestState::Embedded {
                    points: chunks
                        .into_iter()
                        .zip(vectors)
                        .map(|(chunk, vector)| IndexPoint {
                            chunk,
                            vector,
                            filename: filename.to_string(),
                        })
                        .collect(),
                },
                Err(e) => IngestState::Failed {
                    error: DocqaError::Embedding(e),
                    rollback: Rollback::Nothing,
                },
            },

            IngestState::Embedded { points } => match self.index_points(&points).await {
                Ok(()) => IngestState::Indexed {
                    chunk_ids: points.iter().map(|p| p.chunk.id).collect(),
                },
                Err(e) => IngestState::Failed {
                    error: DocqaError::VectorStore(e),
                    rollback: Rollback::DeleteVectors,
                },
            },

            IngestState::Indexed { chunk_ids } => IngestState::Ready { chunk_ids },

            // Terminal states are handled by the driver loop.
            terminal => terminal,
        }
    }

    /// Embed chunk texts in provider-sized batches, concurrently, with
    /// per-batch retry. Batch order is preserved so vectors line up with
    /// chunks.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batches = texts.chunks(self.batch_size).map(|batch| {
            with_retry(&self.retry, || {
                self.embedder.embed(batch, EmbedInput::Document)
            })
        });

        let results = try_join_all(batches).await?;
        let vectors: Vec<Vec<f32>> = results.into_iter().flatten().collect();

        if vectors.len() != chunks.len() {
            return Err(ServiceError::ResponseParse {
                message: format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            });
        }
        Ok(vectors)
    }

    async fn index_points(&self, points: &[IndexPoint]) -> std::result::Result<(), ServiceError> {
        with_retry(&self.retry, || self.index.ensure_collection()).await?;
        with_retry(&self.retry, || self.index.upsert(points)).await
    }

    /// Best-effort removal of partially written vectors. A rollback failure
    /// is logged, not propagated; the original stage error is what the
    /// caller needs to see.
    async fn rollback(&self, id: Uuid) {
        match with_retry(&self.retry, || self.index.delete_by_document(id)).await {
            Ok(removed) => {
                if removed > 0 {
                    warn!(document_id = %id, removed = removed, "Rolled back partial index writes");
                }
            }
            Err(e) => {
                error!(document_id = %id, error = %e, "Rollback of partial index writes failed");
            }
        }
    }

    /// Delete a document: vectors first, then the registry record.
    ///
    /// Returns the number of vectors removed. Zero is normal for a
    /// document deleted mid-ingestion or after a failed ingestion.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<usize> {
        // Confirms existence before touching the index.
        self.registry.get(id).await?;

        let removed = with_retry(&self.retry, || self.index.delete_by_document(id))
            .await
            .map_err(DocqaError::VectorStore)?;
        self.registry.remove(id).await?;
        info!(document_id = %id, removed = removed, "Document deleted");
        Ok(removed)
    }
}
